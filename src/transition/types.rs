//! Transition configuration and results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::Sentiment;
use crate::switching::SwitchApproach;

/// How a persona change is rendered, from least to most visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionType {
    Seamless,
    Gradual,
    Bridged,
    Explicit,
}

impl TransitionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seamless => "seamless",
            Self::Gradual => "gradual",
            Self::Bridged => "bridged",
            Self::Explicit => "explicit",
        }
    }

    /// User-facing approach implied by the transition type.
    pub fn approach(&self) -> SwitchApproach {
        match self {
            Self::Seamless | Self::Gradual => SwitchApproach::Seamless,
            Self::Bridged => SwitchApproach::Acknowledged,
            Self::Explicit => SwitchApproach::Explicit,
        }
    }
}

/// Transition tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionConfig {
    /// How strongly the new persona is asserted, in `[0, 1]`.
    #[serde(default = "default_intensity")]
    pub intensity: f64,
    /// Force a transition type instead of selecting one.
    #[serde(default)]
    pub approach: Option<TransitionType>,
    #[serde(default)]
    pub notify_user: bool,
    #[serde(default = "default_true")]
    pub preserve_context: bool,
    /// Messages over which the new persona settles.
    #[serde(default = "default_stabilization")]
    pub stabilization_messages: u32,
}

fn default_intensity() -> f64 { 0.5 }
fn default_true() -> bool { true }
fn default_stabilization() -> u32 { 2 }

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            intensity: default_intensity(),
            approach: None,
            notify_user: false,
            preserve_context: true,
            stabilization_messages: default_stabilization(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeKind {
    Acknowledgment,
    TraitBlend,
    ContextCarry,
    ToneShift,
}

/// One piece of the bridge passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgingElement {
    pub kind: BridgeKind,
    pub content: String,
}

/// Estimated disruption to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserImpact {
    Minimal,
    Low,
    Moderate,
    High,
}

impl UserImpact {
    pub fn from_score(score: f64) -> Self {
        if score < 0.2 {
            Self::Minimal
        } else if score < 0.4 {
            Self::Low
        } else if score < 0.6 {
            Self::Moderate
        } else {
            Self::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionMetadata {
    pub from_persona_id: String,
    pub to_persona_id: String,
    pub transition_type: TransitionType,
    pub approach: SwitchApproach,
    pub trait_distance: f64,
    pub intensity: f64,
    /// Estimated smoothness in `[0, 1]`.
    pub smoothing_quality: f64,
    pub user_impact: UserImpact,
    pub stabilization_messages: u32,
    pub created_at: DateTime<Utc>,
}

/// Output of [`super::TransitionSmoother::create_smooth_transition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothTransition {
    pub smoothed_prompt: String,
    pub bridging_elements: Vec<BridgingElement>,
    pub metadata: TransitionMetadata,
    /// Present only for acknowledged or explicit approaches.
    pub user_message: Option<String>,
}

/// Conversation facts used to tune a transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationStats {
    pub message_count: usize,
    pub switch_count: u32,
    pub average_message_length: f64,
    pub recent_sentiment: Option<Sentiment>,
}
