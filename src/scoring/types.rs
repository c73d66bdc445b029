//! Compatibility score types.

use serde::{Deserialize, Serialize};

use crate::types::PersonaCategory;

/// Independent sub-scores, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    /// Persona category and intent-preferred traits vs. detected intent.
    pub intent_fit: f64,
    /// Persona capability vs. demanded complexity.
    pub complexity_fit: f64,
    /// Persona traits vs. suggested adjustments, style and emotion.
    pub trait_alignment: f64,
}

impl SubScores {
    pub fn as_array(&self) -> [f64; 3] {
        [self.intent_fit, self.complexity_fit, self.trait_alignment]
    }

    /// Labelled values in a fixed order.
    pub fn named(&self) -> [(&'static str, f64); 3] {
        [
            ("intent fit", self.intent_fit),
            ("complexity fit", self.complexity_fit),
            ("trait alignment", self.trait_alignment),
        ]
    }
}

/// Why a persona scored the way it did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreRationale {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    /// Persona traits relevant to the analysis, weight ≥ 0.5.
    pub matching_traits: Vec<String>,
}

/// Fit of one persona against one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityScore {
    pub persona_id: String,
    /// Weighted combination of the sub-scores, in `[0, 1]`.
    pub overall: f64,
    pub sub_scores: SubScores,
    /// High when the overall score is high and the sub-scores agree.
    pub confidence: f64,
    pub rationale: ScoreRationale,
}

/// Options for [`super::CompatibilityScorer::rank`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankOptions {
    /// Candidates below this confidence are dropped.
    #[serde(default)]
    pub confidence_threshold: f64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    5
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.0,
            max_results: default_max_results(),
        }
    }
}

/// One ranked candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPersona {
    pub persona_id: String,
    pub persona_name: String,
    pub category: PersonaCategory,
    pub score: CompatibilityScore,
}
