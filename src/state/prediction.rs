//! Naive next-persona prediction.
//!
//! Three sources are tried in order, each with a fixed confidence:
//! a learned trigger mapping for the current intent (0.8), the most recent
//! persona that performed well (0.6), then the configured default (0.3).

use serde::{Deserialize, Serialize};

use super::evolution::{EvolutionTracking, INITIAL_MAPPING_STRENGTH};
use super::snapshot::StateSnapshot;

pub const LEARNED_CONFIDENCE: f64 = 0.8;
pub const RECENT_CONFIDENCE: f64 = 0.6;
pub const DEFAULT_CONFIDENCE: f64 = 0.3;
/// Alignment a snapshot needs to count as effective.
const EFFECTIVE_ALIGNMENT: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    LearnedMapping,
    RecentlyEffective,
    Default,
}

impl PredictionSource {
    pub fn confidence(&self) -> f64 {
        match self {
            Self::LearnedMapping => LEARNED_CONFIDENCE,
            Self::RecentlyEffective => RECENT_CONFIDENCE,
            Self::Default => DEFAULT_CONFIDENCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaAlternative {
    pub persona_id: String,
    pub confidence: f64,
    pub source: PredictionSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaPrediction {
    pub thread_id: String,
    pub persona_id: String,
    pub confidence: f64,
    pub source: PredictionSource,
    /// Trigger label the prediction was made for.
    pub trigger: String,
    /// Lower-ranked candidates from the remaining sources, deduplicated.
    pub alternatives: Vec<PersonaAlternative>,
    pub reasoning: String,
}

/// Walk the fallback chain.
pub fn predict(
    thread_id: &str,
    trigger: &str,
    evolution: Option<&EvolutionTracking>,
    snapshots: &[&StateSnapshot],
    default_persona_id: &str,
) -> PersonaPrediction {
    let mut candidates: Vec<(String, PredictionSource)> = Vec::new();

    if let Some(mapping) = evolution.and_then(|e| e.mapping_for(trigger, INITIAL_MAPPING_STRENGTH)) {
        candidates.push((mapping.persona_id.clone(), PredictionSource::LearnedMapping));
    }

    let recent = snapshots
        .iter()
        .rev()
        .find(|s| s.alignment() >= EFFECTIVE_ALIGNMENT)
        .map(|s| s.persona_id().to_string())
        .or_else(|| {
            evolution
                .and_then(|e| e.most_recently_effective())
                .map(str::to_string)
        });
    if let Some(id) = recent {
        candidates.push((id, PredictionSource::RecentlyEffective));
    }

    candidates.push((default_persona_id.to_string(), PredictionSource::Default));

    let mut seen = std::collections::HashSet::new();
    candidates.retain(|(id, _)| seen.insert(id.clone()));

    let mut iter = candidates.into_iter();
    // The default candidate is always present.
    let (persona_id, source) = iter
        .next()
        .unwrap_or_else(|| (default_persona_id.to_string(), PredictionSource::Default));

    let reasoning = match source {
        PredictionSource::LearnedMapping => {
            format!("Switches on '{}' have previously led to {}", trigger, persona_id)
        }
        PredictionSource::RecentlyEffective => {
            format!("{} performed well recently in this thread", persona_id)
        }
        PredictionSource::Default => "No history for this thread; using the default persona".to_string(),
    };

    PersonaPrediction {
        thread_id: thread_id.to_string(),
        confidence: source.confidence(),
        alternatives: iter
            .map(|(persona_id, source)| PersonaAlternative {
                persona_id,
                confidence: source.confidence(),
                source,
            })
            .collect(),
        persona_id,
        source,
        trigger: trigger.to_string(),
        reasoning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::evolution::{ChangeType, PersonaChange};

    #[test]
    fn test_empty_history_uses_default() {
        let p = predict("t", "analysis", None, &[], "default-assistant");
        assert_eq!(p.persona_id, "default-assistant");
        assert_eq!(p.source, PredictionSource::Default);
        assert_eq!(p.confidence, 0.3);
        assert!(p.alternatives.is_empty());
    }

    #[test]
    fn test_learned_mapping_wins() {
        let mut evo = EvolutionTracking::new("t");
        evo.record(PersonaChange::new(
            ChangeType::PersonaSwitch,
            "switch",
            Some("casual"),
            Some("tech"),
            "technical_support",
            Some(0.5),
        ));
        let p = predict("t", "technical_support", Some(&evo), &[], "default-assistant");
        assert_eq!(p.persona_id, "tech");
        assert_eq!(p.confidence, 0.8);
        // "tech" also counts as recently effective, so it is deduplicated.
        assert_eq!(p.alternatives.len(), 1);
        assert_eq!(p.alternatives[0].persona_id, "default-assistant");
    }

    #[test]
    fn test_unmatched_trigger_falls_through() {
        let mut evo = EvolutionTracking::new("t");
        evo.record(PersonaChange::new(
            ChangeType::PersonaSwitch,
            "switch",
            Some("casual"),
            Some("tech"),
            "technical_support",
            Some(0.5),
        ));
        let p = predict("t", "emotional_support", Some(&evo), &[], "default-assistant");
        assert_eq!(p.source, PredictionSource::RecentlyEffective);
        assert_eq!(p.persona_id, "tech");
        assert_eq!(p.confidence, 0.6);
    }
}
