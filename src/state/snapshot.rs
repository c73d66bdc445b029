//! Point-in-time persona state for one thread.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::ConversationIntent;
use crate::switching::TraitDelta;
use crate::types::{Message, PersonaCategory, PersonaDefinition};
use crate::utilities::bounded_log::Keyed;
use crate::utilities::string_utils::clamp_unit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotReason {
    ConversationStart,
    Periodic,
    PersonaSwitch,
    TraitAdjustment,
    Manual,
}

impl SnapshotReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConversationStart => "conversation_start",
            Self::Periodic => "periodic",
            Self::PersonaSwitch => "persona_switch",
            Self::TraitAdjustment => "trait_adjustment",
            Self::Manual => "manual",
        }
    }
}

/// Which persona was active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivePersonaSummary {
    pub persona_id: String,
    /// Empty when the persona could not be resolved.
    pub name: String,
    pub category: Option<PersonaCategory>,
    pub top_traits: Vec<String>,
}

impl ActivePersonaSummary {
    pub fn of(persona: &PersonaDefinition) -> Self {
        Self {
            persona_id: persona.id.clone(),
            name: persona.name.clone(),
            category: Some(persona.category),
            top_traits: persona.top_traits(3).iter().map(|t| t.name.clone()).collect(),
        }
    }

    pub fn unresolved(persona_id: &str) -> Self {
        Self {
            persona_id: persona_id.to_string(),
            name: String::new(),
            category: None,
            top_traits: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetrics {
    pub message_count: usize,
    pub user_message_count: usize,
    pub average_message_length: f64,
    pub intent: ConversationIntent,
    pub topics: Vec<String>,
}

/// The four performance scores, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Compatibility of the active persona with the conversation.
    pub context_alignment_score: f64,
    pub user_engagement_score: f64,
    pub response_quality_score: f64,
    /// Agreement with the previous snapshot.
    pub consistency_score: f64,
}

/// Chain links and bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub reason: SnapshotReason,
    pub previous_snapshot_id: Option<String>,
    pub next_snapshot_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub id: String,
    pub thread_id: String,
    pub timestamp: DateTime<Utc>,
    pub active_persona: ActivePersonaSummary,
    /// Trait adjustments applied to the active persona so far.
    pub trait_adjustments: Vec<TraitDelta>,
    pub conversation_metrics: ConversationMetrics,
    pub performance_metrics: PerformanceMetrics,
    pub metadata: SnapshotMetadata,
}

impl Keyed for StateSnapshot {
    fn key(&self) -> &str {
        &self.id
    }
}

impl StateSnapshot {
    pub fn persona_id(&self) -> &str {
        &self.active_persona.persona_id
    }

    pub fn alignment(&self) -> f64 {
        self.performance_metrics.context_alignment_score
    }
}

// ---------------------------------------------------------------------------
// Metric helpers
// ---------------------------------------------------------------------------

fn mean_chars<'a>(messages: impl Iterator<Item = &'a Message>) -> Option<f64> {
    let (total, count) = messages.fold((0usize, 0usize), |(t, c), m| (t + m.content.chars().count(), c + 1));
    (count > 0).then(|| total as f64 / count as f64)
}

/// Participation and message length of the user.
pub fn engagement_score(messages: &[Message]) -> f64 {
    let user = messages.iter().filter(|m| m.is_user()).count();
    if user == 0 {
        return 0.0;
    }
    let others = (messages.len() - user).max(1);
    let participation = (user as f64 / others as f64).min(1.0);
    let length = mean_chars(messages.iter().filter(|m| m.is_user()))
        .map(|l| (l / 150.0).min(1.0))
        .unwrap_or(0.0);
    clamp_unit(0.5 * participation + 0.5 * length)
}

/// Substance of assistant replies blended with alignment.
pub fn response_quality_score(messages: &[Message], alignment: f64) -> f64 {
    match mean_chars(messages.iter().filter(|m| !m.is_user())) {
        Some(len) => clamp_unit(0.5 * (len / 300.0).min(1.0) + 0.5 * alignment),
        None => clamp_unit(alignment),
    }
}

/// Agreement of a new snapshot with the one before it.
pub fn consistency_with(previous: Option<&StateSnapshot>, persona_id: &str, alignment: f64) -> f64 {
    match previous {
        None => 1.0,
        Some(prev) => {
            let stability = 1.0 - (prev.alignment() - alignment).abs();
            if prev.persona_id() == persona_id {
                clamp_unit(stability)
            } else {
                clamp_unit(0.5 * stability)
            }
        }
    }
}

pub fn average_message_length(messages: &[Message]) -> f64 {
    mean_chars(messages.iter()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engagement_requires_user_messages() {
        assert_eq!(engagement_score(&[Message::assistant("hello")]), 0.0);
        let balanced = vec![Message::user("x".repeat(150)), Message::assistant("ok")];
        assert!((engagement_score(&balanced) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_response_quality_without_assistant_is_alignment() {
        assert_eq!(response_quality_score(&[Message::user("hi")], 0.7), 0.7);
    }

    #[test]
    fn test_consistency_with_previous() {
        assert_eq!(consistency_with(None, "a", 0.5), 1.0);
    }
}
