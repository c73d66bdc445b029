//! Decision and adaptation records produced by the orchestrator.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{ContextAnalysisResult, ConversationIntent};
use crate::types::{PersonaCategory, PersonaDefinition};

// ---------------------------------------------------------------------------
// Thread state machine
// ---------------------------------------------------------------------------

/// `Stable → Evaluating → {Stable | Transitioning} → Stable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchPhase {
    #[default]
    Stable,
    Evaluating,
    Transitioning,
}

/// One executed switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchRecord {
    pub from_persona_id: String,
    pub to_persona_id: String,
    pub switched_at: DateTime<Utc>,
    pub improvement: f64,
    pub adaptation_type: AdaptationType,
    pub reasons: Vec<String>,
}

/// Switching state the orchestrator keeps per thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadSwitchState {
    pub switch_count: u32,
    pub last_switch_at: Option<DateTime<Utc>>,
    pub phase: SwitchPhase,
    pub history: Vec<SwitchRecord>,
}

/// Read-only view of a thread's switching state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadStatus {
    pub thread_id: String,
    pub phase: SwitchPhase,
    pub switch_count: u32,
    pub max_switches: u32,
    pub last_switch_at: Option<DateTime<Utc>>,
    pub cooldown_remaining_secs: u64,
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// A persona as seen by a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaSnapshot {
    pub id: String,
    pub name: String,
    pub category: PersonaCategory,
    /// Overall compatibility with the analyzed context, when scored.
    pub score: Option<f64>,
}

impl PersonaSnapshot {
    pub fn of(persona: &PersonaDefinition, score: Option<f64>) -> Self {
        Self {
            id: persona.id.clone(),
            name: persona.name.clone(),
            category: persona.category,
            score,
        }
    }
}

/// The best alternative to the current persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedPersona {
    pub persona: PersonaSnapshot,
    pub confidence: f64,
    /// Overall-score gain over the current persona.
    pub improvement: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchIntensity {
    None,
    Moderate,
    Immediate,
}

/// How visible a persona change is to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchApproach {
    Seamless,
    Acknowledged,
    Explicit,
}

impl SwitchApproach {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seamless => "seamless",
            Self::Acknowledged => "acknowledged",
            Self::Explicit => "explicit",
        }
    }

    /// Whether the user is told about the change.
    pub fn is_visible(&self) -> bool {
        !matches!(self, Self::Seamless)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchingStrategy {
    pub intensity: SwitchIntensity,
    /// Traits the new persona should lead with.
    pub priority_traits: Vec<String>,
    pub approach: SwitchApproach,
}

impl SwitchingStrategy {
    pub fn hold() -> Self {
        Self {
            intensity: SwitchIntensity::None,
            priority_traits: Vec::new(),
            approach: SwitchApproach::Seamless,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionReasoning {
    /// One-line explanation.
    pub summary: String,
    /// Trigger reasons from the analysis.
    pub triggers: Vec<String>,
    /// Scoring observations.
    pub factors: Vec<String>,
    /// Set when a policy gate short-circuited the decision.
    pub gate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetadata {
    pub thread_id: Option<String>,
    pub decided_at: DateTime<Utc>,
    pub switch_count: u32,
    pub alternatives_considered: usize,
    /// Absent when a gate skipped analysis.
    pub analysis: Option<ContextAnalysisResult>,
}

/// Outcome of [`super::SwitchingOrchestrator::decide`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchingDecision {
    pub should_switch: bool,
    pub current_persona: PersonaSnapshot,
    pub recommended: Option<RecommendedPersona>,
    pub confidence: f64,
    pub reasoning: DecisionReasoning,
    pub strategy: SwitchingStrategy,
    pub metadata: DecisionMetadata,
}

impl SwitchingDecision {
    /// Whether a policy gate decided without analysis.
    pub fn was_gated(&self) -> bool {
        self.reasoning.gate.is_some()
    }

    pub fn intent(&self) -> Option<ConversationIntent> {
        self.metadata.analysis.as_ref().map(|a| a.intent)
    }
}

// ---------------------------------------------------------------------------
// Adaptation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationType {
    None,
    TraitAdjustment,
    PersonalitySwitch,
    Hybrid,
}

impl AdaptationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::TraitAdjustment => "trait_adjustment",
            Self::PersonalitySwitch => "personality_switch",
            Self::Hybrid => "hybrid",
        }
    }

    /// Whether the active persona changes.
    pub fn changes_persona(&self) -> bool {
        matches!(self, Self::PersonalitySwitch | Self::Hybrid)
    }
}

/// Change of one trait weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitDelta {
    pub trait_name: String,
    pub from: f64,
    pub to: f64,
    pub delta: f64,
}

impl TraitDelta {
    pub fn new(trait_name: impl Into<String>, from: f64, to: f64) -> Self {
        Self {
            trait_name: trait_name.into(),
            from,
            to,
            delta: to - from,
        }
    }
}

/// Active persona plus effective trait weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaState {
    pub persona_id: String,
    pub persona_name: String,
    pub trait_weights: BTreeMap<String, f64>,
}

impl PersonaState {
    pub fn of(persona: &PersonaDefinition) -> Self {
        Self {
            persona_id: persona.id.clone(),
            persona_name: persona.name.clone(),
            trait_weights: persona
                .traits
                .iter()
                .map(|t| (t.name.to_lowercase(), t.weight))
                .collect(),
        }
    }

    /// Placeholder for a persona that could not be resolved.
    pub fn unresolved(persona_id: &str) -> Self {
        Self {
            persona_id: persona_id.to_string(),
            persona_name: String::new(),
            trait_weights: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationMetadata {
    pub thread_id: Option<String>,
    pub adapted_at: DateTime<Utc>,
    /// Set when a lookup failure was converted into a no-op result.
    pub error: Option<String>,
}

/// Outcome of [`super::SwitchingOrchestrator::adapt`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptationResult {
    pub adapted: bool,
    pub adaptation_type: AdaptationType,
    pub previous_state: PersonaState,
    pub new_state: PersonaState,
    pub trait_deltas: Vec<TraitDelta>,
    pub enhanced_prompt: Option<String>,
    pub rationale: Vec<String>,
    pub user_notification: Option<String>,
    pub confidence: f64,
    /// The decision this adaptation acted on; absent on lookup failure.
    pub decision: Option<SwitchingDecision>,
    pub metadata: AdaptationMetadata,
}

impl AdaptationResult {
    /// A result that changed nothing.
    pub fn unchanged(
        current: PersonaState,
        thread_id: Option<&str>,
        rationale: Vec<String>,
        decision: Option<SwitchingDecision>,
        error: Option<String>,
    ) -> Self {
        let confidence = decision.as_ref().map(|d| d.confidence).unwrap_or(0.0);
        Self {
            adapted: false,
            adaptation_type: AdaptationType::None,
            previous_state: current.clone(),
            new_state: current,
            trait_deltas: Vec::new(),
            enhanced_prompt: None,
            rationale,
            user_notification: None,
            confidence,
            decision,
            metadata: AdaptationMetadata {
                thread_id: thread_id.map(str::to_string),
                adapted_at: Utc::now(),
                error,
            },
        }
    }

    /// Id of the persona active after this adaptation.
    pub fn active_persona_id(&self) -> &str {
        &self.new_state.persona_id
    }
}

/// A window of history where triggers fired, found by a monitoring sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchOpportunity {
    /// Inclusive start message index.
    pub start: usize,
    /// Exclusive end message index.
    pub end: usize,
    pub intent: ConversationIntent,
    pub confidence: f64,
    pub reasons: Vec<String>,
    /// Best-ranked alternative for the window, if any.
    pub suggested_persona_id: Option<String>,
}
