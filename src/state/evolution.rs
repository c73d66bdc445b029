//! Append-only persona change timeline with derived trends.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utilities::string_utils::clamp_unit;

/// Strength given to a mapping the first time it is observed.
pub const INITIAL_MAPPING_STRENGTH: f64 = 0.5;
/// How far one observed impact moves a mapping's strength.
const MAPPING_LEARNING_RATE: f64 = 0.25;
/// Changes considered for switch likelihood.
const LIKELIHOOD_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    PersonaSwitch,
    TraitAdjustment,
    ConfigurationChange,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PersonaSwitch => "persona_switch",
            Self::TraitAdjustment => "trait_adjustment",
            Self::ConfigurationChange => "configuration_change",
        }
    }
}

/// One entry of the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaChange {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub change_type: ChangeType,
    pub description: String,
    pub from_persona_id: Option<String>,
    pub to_persona_id: Option<String>,
    /// What caused the change, usually an intent label.
    pub trigger: String,
    /// Observed effect in `[-1, 1]`, when known.
    pub impact: Option<f64>,
}

impl PersonaChange {
    pub fn new(
        change_type: ChangeType,
        description: impl Into<String>,
        from_persona_id: Option<&str>,
        to_persona_id: Option<&str>,
        trigger: impl Into<String>,
        impact: Option<f64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            change_type,
            description: description.into(),
            from_persona_id: from_persona_id.map(str::to_string),
            to_persona_id: to_persona_id.map(str::to_string),
            trigger: trigger.into(),
            impact: impact.map(|i| i.clamp(-1.0, 1.0)),
        }
    }

    pub fn is_switch(&self) -> bool {
        self.change_type == ChangeType::PersonaSwitch
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvolutionTrends {
    pub total_changes: usize,
    pub switch_count: usize,
    /// Times each persona was switched to.
    pub persona_usage: BTreeMap<String, usize>,
    pub trigger_histogram: BTreeMap<String, usize>,
    pub average_impact: Option<f64>,
    /// 1.0 with no switches, falling as switches accumulate.
    pub stability_score: f64,
    pub mean_switch_interval_secs: Option<f64>,
}

/// A trigger observed to lead to a persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedMapping {
    pub trigger: String,
    pub persona_id: String,
    /// In `[0, 1]`; raised by positive impact, lowered by negative impact.
    pub strength: f64,
    pub observations: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictiveIndicators {
    pub likely_next_persona: Option<String>,
    /// Share of recent changes that were switches.
    pub switch_likelihood: f64,
    pub expected_secs_to_next_switch: Option<f64>,
}

/// Everything the tracker knows about how a thread's persona evolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionTracking {
    pub thread_id: String,
    pub timeline: Vec<PersonaChange>,
    pub trends: EvolutionTrends,
    pub learned_mappings: Vec<LearnedMapping>,
    pub indicators: PredictiveIndicators,
}

impl EvolutionTracking {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            timeline: Vec::new(),
            trends: EvolutionTrends {
                stability_score: 1.0,
                ..Default::default()
            },
            learned_mappings: Vec::new(),
            indicators: PredictiveIndicators::default(),
        }
    }

    /// Append a change and refresh every derived aggregate.
    pub fn record(&mut self, change: PersonaChange) {
        if let Some(to) = change.to_persona_id.as_deref() {
            if change.is_switch() {
                self.learn(&change.trigger, to, change.impact);
            }
        }
        self.timeline.push(change);
        self.trends = compute_trends(&self.timeline);
        self.indicators = compute_indicators(&self.timeline, &self.trends);
    }

    fn learn(&mut self, trigger: &str, persona_id: &str, impact: Option<f64>) {
        match self
            .learned_mappings
            .iter_mut()
            .find(|m| m.trigger == trigger && m.persona_id == persona_id)
        {
            Some(mapping) => {
                mapping.observations += 1;
                mapping.strength =
                    clamp_unit(mapping.strength + MAPPING_LEARNING_RATE * impact.unwrap_or(0.0));
            }
            None => self.learned_mappings.push(LearnedMapping {
                trigger: trigger.to_string(),
                persona_id: persona_id.to_string(),
                strength: clamp_unit(
                    INITIAL_MAPPING_STRENGTH + MAPPING_LEARNING_RATE * impact.unwrap_or(0.0),
                ),
                observations: 1,
            }),
        }
    }

    /// Strongest mapping for a trigger with at least `min_strength`.
    pub fn mapping_for(&self, trigger: &str, min_strength: f64) -> Option<&LearnedMapping> {
        self.learned_mappings
            .iter()
            .filter(|m| m.trigger == trigger && m.strength >= min_strength)
            .max_by(|a, b| {
                a.strength
                    .partial_cmp(&b.strength)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.observations.cmp(&b.observations))
            })
    }

    /// Target of the latest switch whose impact was positive.
    pub fn most_recently_effective(&self) -> Option<&str> {
        self.timeline
            .iter()
            .rev()
            .filter(|c| c.is_switch() && c.impact.map(|i| i > 0.0).unwrap_or(false))
            .find_map(|c| c.to_persona_id.as_deref())
    }
}

fn compute_trends(timeline: &[PersonaChange]) -> EvolutionTrends {
    let switches: Vec<&PersonaChange> = timeline.iter().filter(|c| c.is_switch()).collect();

    let mut persona_usage = BTreeMap::new();
    for to in switches.iter().filter_map(|c| c.to_persona_id.as_ref()) {
        *persona_usage.entry(to.clone()).or_insert(0) += 1;
    }

    let mut trigger_histogram = BTreeMap::new();
    for change in timeline {
        *trigger_histogram.entry(change.trigger.clone()).or_insert(0) += 1;
    }

    let impacts: Vec<f64> = timeline.iter().filter_map(|c| c.impact).collect();
    let average_impact = (!impacts.is_empty()).then(|| impacts.iter().sum::<f64>() / impacts.len() as f64);

    let intervals: Vec<f64> = switches
        .windows(2)
        .map(|w| (w[1].timestamp - w[0].timestamp).num_milliseconds() as f64 / 1000.0)
        .collect();
    let mean_switch_interval_secs =
        (!intervals.is_empty()).then(|| intervals.iter().sum::<f64>() / intervals.len() as f64);

    EvolutionTrends {
        total_changes: timeline.len(),
        switch_count: switches.len(),
        persona_usage,
        trigger_histogram,
        average_impact,
        stability_score: 1.0 / (1.0 + switches.len() as f64 / 3.0),
        mean_switch_interval_secs,
    }
}

fn compute_indicators(timeline: &[PersonaChange], trends: &EvolutionTrends) -> PredictiveIndicators {
    // Most used target; ties go to the most recent one.
    let likely_next_persona = trends
        .persona_usage
        .iter()
        .max_by(|a, b| {
            a.1.cmp(b.1).then_with(|| {
                let last = |id: &str| timeline.iter().rposition(|c| c.to_persona_id.as_deref() == Some(id));
                last(a.0).cmp(&last(b.0))
            })
        })
        .map(|(id, _)| id.clone());

    let recent = &timeline[timeline.len().saturating_sub(LIKELIHOOD_WINDOW)..];
    let switch_likelihood = if recent.is_empty() {
        0.0
    } else {
        recent.iter().filter(|c| c.is_switch()).count() as f64 / recent.len() as f64
    };

    PredictiveIndicators {
        likely_next_persona,
        switch_likelihood,
        expected_secs_to_next_switch: trends.mean_switch_interval_secs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn switch(to: &str, trigger: &str, impact: Option<f64>) -> PersonaChange {
        PersonaChange::new(ChangeType::PersonaSwitch, "switch", Some("a"), Some(to), trigger, impact)
    }

    #[test]
    fn test_trends_aggregate() {
        let mut evo = EvolutionTracking::new("t");
        evo.record(switch("tech", "technical_support", Some(0.4)));
        evo.record(PersonaChange::new(
            ChangeType::TraitAdjustment,
            "nudge",
            Some("tech"),
            None,
            "analysis",
            Some(-0.2),
        ));
        evo.record(switch("tech", "technical_support", None));

        let t = &evo.trends;
        assert_eq!(t.total_changes, 3);
        assert_eq!(t.switch_count, 2);
        assert_eq!(t.persona_usage.get("tech"), Some(&2));
        assert_eq!(t.trigger_histogram.get("technical_support"), Some(&2));
        assert!((t.average_impact.unwrap() - 0.1).abs() < 1e-9);
        assert!((t.stability_score - 0.6).abs() < 1e-9);
        assert!(t.mean_switch_interval_secs.is_some());
        assert_eq!(evo.indicators.likely_next_persona.as_deref(), Some("tech"));
        assert!((evo.indicators.switch_likelihood - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_mappings_strengthen_and_weaken() {
        let mut evo = EvolutionTracking::new("t");
        evo.record(switch("tech", "technical_support", Some(1.0)));
        let m = evo.mapping_for("technical_support", 0.5).unwrap();
        assert_eq!(m.persona_id, "tech");
        assert!((m.strength - 0.75).abs() < 1e-9);

        evo.record(switch("tech", "technical_support", Some(-1.0)));
        evo.record(switch("tech", "technical_support", Some(-1.0)));
        assert!(evo.mapping_for("technical_support", 0.5).is_none());
        assert_eq!(evo.learned_mappings[0].observations, 3);
    }

    #[test]
    fn test_most_recently_effective() {
        let mut evo = EvolutionTracking::new("t");
        assert!(evo.most_recently_effective().is_none());
        evo.record(switch("first", "x", Some(0.3)));
        evo.record(switch("second", "y", Some(-0.3)));
        assert_eq!(evo.most_recently_effective(), Some("first"));
    }
}
