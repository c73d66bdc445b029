//! Compatibility scorer: how well a persona fits a [`ContextAnalysisResult`].
//!
//! Three independent sub-scores are blended with fixed weights:
//!
//! | sub-score         | weight | inputs                                        |
//! |-------------------|--------|-----------------------------------------------|
//! | intent fit        | 0.4    | persona category, intent-preferred traits     |
//! | complexity fit    | 0.3    | capability traits vs. complexity level        |
//! | trait alignment   | 0.3    | suggested adjustments, style, emotion         |
//!
//! [`CompatibilityScorer::score_persona`] is a pure function of its inputs.

pub mod types;

use std::sync::Arc;

use crate::analysis::{CommunicationStyle, ComplexityLevel, ContextAnalysisResult, ConversationIntent};
use crate::interfaces::PersonaStore;
use crate::types::{PersonaCategory, PersonaDefinition};
use crate::utilities::errors::LookupError;
use crate::utilities::string_utils::clamp_unit;

pub use types::{CompatibilityScore, RankOptions, RankedPersona, ScoreRationale, SubScores};

const INTENT_WEIGHT: f64 = 0.4;
const COMPLEXITY_WEIGHT: f64 = 0.3;
const ALIGNMENT_WEIGHT: f64 = 0.3;

const PRIMARY_CATEGORY: f64 = 1.0;
const SECONDARY_CATEGORY: f64 = 0.7;
const CUSTOM_CATEGORY: f64 = 0.5;
const OTHER_CATEGORY: f64 = 0.2;

/// Capability assumed for personas with no capability traits.
const BASELINE_CAPABILITY: f64 = 0.3;
const CAPABILITY_TRAITS: [&str; 3] = ["technical_depth", "expertise_level", "analytical_rigor"];

// ---------------------------------------------------------------------------
// Intent profiles
// ---------------------------------------------------------------------------

struct IntentProfile {
    primary: &'static [PersonaCategory],
    secondary: &'static [PersonaCategory],
    traits: &'static [&'static str],
}

fn intent_profile(intent: ConversationIntent) -> IntentProfile {
    use ConversationIntent as I;
    use PersonaCategory as C;

    let (primary, secondary, traits): (&[C], &[C], &[&str]) = match intent {
        I::InformationSeeking => (
            &[C::Assistant, C::Educational],
            &[C::Professional, C::Analytical],
            &["helpfulness", "precision", "domain_knowledge"],
        ),
        I::ProblemSolving => (
            &[C::Technical, C::Analytical],
            &[C::Assistant, C::Professional],
            &["analytical_rigor", "technical_depth", "precision"],
        ),
        I::CreativeWriting => (&[C::Creative], &[C::Entertainment], &["creativity", "enthusiasm"]),
        I::TechnicalSupport => (
            &[C::Technical],
            &[C::Analytical, C::Professional],
            &["technical_depth", "precision", "domain_knowledge"],
        ),
        I::CasualConversation => (
            &[C::Casual],
            &[C::Entertainment, C::Assistant, C::Supportive],
            &["warmth", "humor", "enthusiasm"],
        ),
        I::Learning => (
            &[C::Educational],
            &[C::Technical, C::Assistant],
            &["patience", "expertise_level", "precision"],
        ),
        I::Analysis => (
            &[C::Analytical],
            &[C::Technical, C::Professional],
            &["analytical_rigor", "precision", "domain_knowledge"],
        ),
        I::DecisionMaking => (
            &[C::Analytical, C::Professional],
            &[C::Assistant],
            &["analytical_rigor", "empathy"],
        ),
        I::EmotionalSupport => (&[C::Supportive], &[C::Casual], &["empathy", "warmth", "patience"]),
        I::Entertainment => (
            &[C::Entertainment, C::Casual],
            &[C::Creative],
            &["humor", "enthusiasm", "creativity"],
        ),
        I::Planning => (
            &[C::Professional, C::Analytical],
            &[C::Assistant],
            &["precision", "analytical_rigor"],
        ),
        I::Feedback => (
            &[C::Professional, C::Educational],
            &[C::Analytical, C::Assistant],
            &["precision", "empathy", "analytical_rigor"],
        ),
    };
    IntentProfile {
        primary,
        secondary,
        traits,
    }
}

fn complexity_demand(level: ComplexityLevel) -> f64 {
    match level {
        ComplexityLevel::Low => 0.2,
        ComplexityLevel::Medium => 0.45,
        ComplexityLevel::High => 0.7,
        ComplexityLevel::Expert => 0.9,
    }
}

fn style_traits(style: CommunicationStyle) -> &'static [&'static str] {
    match style {
        CommunicationStyle::Formal => &["formality"],
        CommunicationStyle::Casual => &["humor", "warmth"],
        CommunicationStyle::Technical => &["technical_depth"],
        CommunicationStyle::Emotional => &["empathy"],
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

/// Scores and ranks personas from a [`PersonaStore`].
#[derive(Clone)]
pub struct CompatibilityScorer {
    store: Arc<dyn PersonaStore>,
}

impl CompatibilityScorer {
    pub fn new(store: Arc<dyn PersonaStore>) -> Self {
        Self { store }
    }

    /// Look up a persona and score it.
    pub async fn score(
        &self,
        persona_id: &str,
        analysis: &ContextAnalysisResult,
    ) -> Result<CompatibilityScore, LookupError> {
        let persona = self.store.find_one(persona_id).await?;
        Ok(self.score_persona(&persona, analysis))
    }

    /// Score a persona that is already in hand.
    pub fn score_persona(
        &self,
        persona: &PersonaDefinition,
        analysis: &ContextAnalysisResult,
    ) -> CompatibilityScore {
        let profile = intent_profile(analysis.intent);

        let sub_scores = SubScores {
            intent_fit: intent_fit(persona, &profile),
            complexity_fit: complexity_fit(persona, analysis.complexity.level),
            trait_alignment: trait_alignment(persona, analysis),
        };

        let overall = clamp_unit(
            INTENT_WEIGHT * sub_scores.intent_fit
                + COMPLEXITY_WEIGHT * sub_scores.complexity_fit
                + ALIGNMENT_WEIGHT * sub_scores.trait_alignment,
        );

        let values = sub_scores.as_array();
        let max = values.iter().cloned().fold(f64::MIN, f64::max);
        let min = values.iter().cloned().fold(f64::MAX, f64::min);
        let confidence = clamp_unit(0.6 * overall + 0.4 * (1.0 - (max - min)));

        CompatibilityScore {
            persona_id: persona.id.clone(),
            overall,
            sub_scores,
            confidence,
            rationale: rationale(persona, analysis, &profile, &sub_scores),
        }
    }

    /// Rank candidates (or every active persona) by overall score.
    ///
    /// Candidates below `confidence_threshold` are dropped and at most
    /// `max_results` are returned. Unknown candidate ids are skipped.
    pub async fn rank(
        &self,
        analysis: &ContextAnalysisResult,
        candidate_ids: Option<&[String]>,
        options: RankOptions,
    ) -> Result<Vec<RankedPersona>, LookupError> {
        let personas = match candidate_ids {
            Some(ids) => {
                let mut found = Vec::with_capacity(ids.len());
                for id in ids {
                    match self.store.find_one(id).await {
                        Ok(p) => found.push(p),
                        Err(LookupError::PersonaNotFound { persona_id }) => {
                            log::warn!("Skipping unknown ranking candidate {}", persona_id);
                        }
                        Err(e) => return Err(e),
                    }
                }
                found
            }
            None => self.store.find_all().await?,
        };

        let mut ranked: Vec<RankedPersona> = personas
            .iter()
            .filter(|p| p.is_active)
            .map(|p| RankedPersona {
                persona_id: p.id.clone(),
                persona_name: p.name.clone(),
                category: p.category,
                score: self.score_persona(p, analysis),
            })
            .filter(|r| r.score.confidence >= options.confidence_threshold)
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .overall
                .partial_cmp(&a.score.overall)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.persona_id.cmp(&b.persona_id))
        });
        ranked.truncate(options.max_results);

        log::debug!(
            "Ranked {} of {} personas for {} intent",
            ranked.len(),
            personas.len(),
            analysis.intent
        );
        Ok(ranked)
    }
}

// ---------------------------------------------------------------------------
// Sub-scores
// ---------------------------------------------------------------------------

fn intent_fit(persona: &PersonaDefinition, profile: &IntentProfile) -> f64 {
    let category = if profile.primary.contains(&persona.category) {
        PRIMARY_CATEGORY
    } else if profile.secondary.contains(&persona.category) {
        SECONDARY_CATEGORY
    } else if persona.category == PersonaCategory::Custom {
        CUSTOM_CATEGORY
    } else {
        OTHER_CATEGORY
    };
    let trait_fit = profile
        .traits
        .iter()
        .map(|t| persona.trait_weight(t))
        .fold(0.0, f64::max);
    clamp_unit(0.6 * category + 0.4 * trait_fit)
}

fn complexity_fit(persona: &PersonaDefinition, level: ComplexityLevel) -> f64 {
    let present: Vec<f64> = CAPABILITY_TRAITS
        .iter()
        .filter_map(|t| persona.trait_named(t).map(|tr| tr.weight))
        .collect();
    let capability = mean(&present).unwrap_or(BASELINE_CAPABILITY);
    clamp_unit(1.0 - (capability - complexity_demand(level)).abs())
}

fn trait_alignment(persona: &PersonaDefinition, analysis: &ContextAnalysisResult) -> f64 {
    let mut components = Vec::new();

    let suggested: Vec<f64> = analysis
        .switching_triggers
        .suggested_trait_adjustments
        .iter()
        .map(|a| persona.trait_weight(&a.trait_name))
        .collect();
    if let Some(m) = mean(&suggested) {
        components.push(m);
    }

    let style: Vec<f64> = style_traits(analysis.user_patterns.communication_style)
        .iter()
        .map(|t| persona.trait_weight(t))
        .collect();
    if let Some(m) = mean(&style) {
        components.push(m);
    }

    if analysis.emotional_context.intensity > 0.5 {
        components.push(persona.trait_weight("empathy"));
    }

    clamp_unit(mean(&components).unwrap_or(0.5))
}

fn rationale(
    persona: &PersonaDefinition,
    analysis: &ContextAnalysisResult,
    profile: &IntentProfile,
    sub_scores: &SubScores,
) -> ScoreRationale {
    let mut out = ScoreRationale::default();

    for (label, value) in sub_scores.named() {
        if value >= 0.7 {
            out.strengths.push(format!("strong {label} ({value:.2})"));
        } else if value < 0.4 {
            out.weaknesses.push(format!("weak {label} ({value:.2})"));
        }
    }

    let mut relevant: Vec<&str> = profile.traits.to_vec();
    relevant.extend(style_traits(analysis.user_patterns.communication_style));
    relevant.extend(
        analysis
            .switching_triggers
            .suggested_trait_adjustments
            .iter()
            .map(|a| a.trait_name.as_str()),
    );

    for t in &persona.traits {
        if t.weight >= 0.5
            && relevant.iter().any(|r| t.name.eq_ignore_ascii_case(r))
            && !out.matching_traits.contains(&t.name)
        {
            out.matching_traits.push(t.name.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ContextAnalyzer, TraitAdjustment};
    use crate::interfaces::catalog::{CASUAL_COMPANION, TECHNICAL_EXPERT};
    use crate::interfaces::{builtin_personas, InMemoryPersonaStore};
    use crate::types::Message;

    fn scorer() -> CompatibilityScorer {
        CompatibilityScorer::new(Arc::new(InMemoryPersonaStore::with_personas(builtin_personas())))
    }

    fn technical_analysis() -> ContextAnalysisResult {
        let mut a = ContextAnalysisResult::safe_default(2, None);
        a.intent = ConversationIntent::TechnicalSupport;
        a.complexity.level = ComplexityLevel::Expert;
        a.complexity.score = 0.6;
        a.user_patterns.communication_style = CommunicationStyle::Technical;
        a.switching_triggers.suggested_trait_adjustments = vec![
            TraitAdjustment {
                trait_name: "technical_depth".into(),
                adjustment: 0.3,
                reason: "technical".into(),
            },
            TraitAdjustment {
                trait_name: "expertise_level".into(),
                adjustment: 0.25,
                reason: "complex".into(),
            },
        ];
        a
    }

    #[tokio::test]
    async fn test_technical_expert_beats_casual_on_technical_context() {
        let s = scorer();
        let analysis = technical_analysis();
        let expert = s.score(TECHNICAL_EXPERT, &analysis).await.unwrap();
        let casual = s.score(CASUAL_COMPANION, &analysis).await.unwrap();

        assert!(expert.overall > 0.9, "expert overall {}", expert.overall);
        assert!(expert.confidence >= 0.75);
        assert!(casual.overall < 0.3, "casual overall {}", casual.overall);
        assert!(expert.overall - casual.overall > 0.3);
        assert!(expert.rationale.matching_traits.contains(&"technical_depth".to_string()));
        assert!(!casual.rationale.weaknesses.is_empty());
    }

    #[tokio::test]
    async fn test_score_is_deterministic() {
        let s = scorer();
        let analysis = technical_analysis();
        let a = s.score(TECHNICAL_EXPERT, &analysis).await.unwrap();
        let b = s.score(TECHNICAL_EXPERT, &analysis).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_unknown_persona_is_lookup_error() {
        let err = scorer().score("ghost", &technical_analysis()).await.unwrap_err();
        assert_eq!(err, LookupError::not_found("ghost"));
    }

    #[tokio::test]
    async fn test_all_scores_in_unit_interval() {
        let s = scorer();
        let analyzer = ContextAnalyzer::new();
        let analysis = analyzer
            .analyze(&[Message::user("I feel so sad and lonely and worried")], None, None)
            .await;
        for persona in builtin_personas() {
            let score = s.score_persona(&persona, &analysis);
            for v in score.sub_scores.as_array() {
                assert!((0.0..=1.0).contains(&v));
            }
            assert!((0.0..=1.0).contains(&score.overall));
            assert!((0.0..=1.0).contains(&score.confidence));
        }
    }

    #[tokio::test]
    async fn test_rank_sorts_filters_and_truncates() {
        let s = scorer();
        let analysis = technical_analysis();

        let all = s.rank(&analysis, None, RankOptions::default()).await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].persona_id, TECHNICAL_EXPERT);
        assert!(all.windows(2).all(|w| w[0].score.overall >= w[1].score.overall));

        let strict = s
            .rank(
                &analysis,
                None,
                RankOptions {
                    confidence_threshold: 0.75,
                    max_results: 10,
                },
            )
            .await
            .unwrap();
        assert!(strict.iter().all(|r| r.score.confidence >= 0.75));
        assert!(strict.iter().any(|r| r.persona_id == TECHNICAL_EXPERT));
    }

    #[tokio::test]
    async fn test_rank_candidates_skips_unknown_and_inactive() {
        let mut personas = builtin_personas();
        for p in &mut personas {
            if p.id == CASUAL_COMPANION {
                p.is_active = false;
            }
        }
        let s = CompatibilityScorer::new(Arc::new(InMemoryPersonaStore::with_personas(personas)));
        let candidates = vec![
            CASUAL_COMPANION.to_string(),
            TECHNICAL_EXPERT.to_string(),
            "ghost".to_string(),
        ];
        let ranked = s
            .rank(&technical_analysis(), Some(&candidates), RankOptions::default())
            .await
            .unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].persona_id, TECHNICAL_EXPERT);
    }

    #[test]
    fn test_capability_baseline_without_traits() {
        let bare = PersonaDefinition::new("bare", "Bare", PersonaCategory::Custom);
        let fit = complexity_fit(&bare, ComplexityLevel::Low);
        assert!((fit - 0.9).abs() < 1e-9);
    }
}
