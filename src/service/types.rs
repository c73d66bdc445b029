//! Request and result types of the switching service.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::ContextAnalysisResult;
use crate::state::{ConsistencyAnalysis, PerformanceTrend};
use crate::switching::{AdaptationResult, AdaptationType, SwitchOpportunity, ThreadStatus};
use crate::transition::{BridgingElement, TransitionMetadata};
use crate::types::{ConversationContext, Message, PersonaCategory};

// ---------------------------------------------------------------------------
// Turn
// ---------------------------------------------------------------------------

/// One conversational turn to run through the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub thread_id: String,
    /// Full history of the thread, oldest first.
    pub messages: Vec<Message>,
    pub current_persona_id: String,
    #[serde(default)]
    pub context: Option<ConversationContext>,
    /// Prompt the active persona would otherwise answer with.
    #[serde(default)]
    pub original_prompt: String,
}

impl TurnRequest {
    pub fn new(thread_id: impl Into<String>, messages: Vec<Message>, current_persona_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            messages,
            current_persona_id: current_persona_id.into(),
            ..Default::default()
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.original_prompt = prompt.into();
        self
    }

    pub fn with_context(mut self, context: ConversationContext) -> Self {
        self.context = Some(context);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// Nothing changed.
    Unchanged,
    /// Trait weights of the active persona were adjusted.
    Adjusted,
    /// A different persona is now active.
    Switched,
    /// A collaborator failed; nothing was changed.
    Failed,
}

/// Transition applied to a switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedTransition {
    pub smoothed_prompt: String,
    pub bridging_elements: Vec<BridgingElement>,
    pub metadata: TransitionMetadata,
}

/// Unified per-turn result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    pub thread_id: String,
    pub status: TurnStatus,
    pub previous_persona_id: String,
    pub active_persona_id: String,
    pub adaptation_type: AdaptationType,
    /// Score of the persona active before the turn.
    pub current_score: Option<f64>,
    /// Score of the newly active persona after a switch.
    pub new_score: Option<f64>,
    pub confidence: f64,
    pub rationale: Vec<String>,
    /// Prompt to send next: smoothed, injected or the original.
    pub prompt: String,
    pub transition: Option<AppliedTransition>,
    pub user_notification: Option<String>,
    pub snapshot_id: Option<String>,
    /// True when the pipeline stopped after scoring.
    pub short_circuited: bool,
    pub analysis: Option<ContextAnalysisResult>,
    pub adaptation: Option<AdaptationResult>,
    pub error: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl TurnResult {
    pub fn switched(&self) -> bool {
        self.status == TurnStatus::Switched
    }

    /// Error-flavored result: nothing changed, confidence 0.
    pub fn failed(request: &TurnRequest, status: TurnStatus, error: String) -> Self {
        Self {
            thread_id: request.thread_id.clone(),
            status,
            previous_persona_id: request.current_persona_id.clone(),
            active_persona_id: request.current_persona_id.clone(),
            adaptation_type: AdaptationType::None,
            current_score: None,
            new_score: None,
            confidence: 0.0,
            rationale: vec![error.clone()],
            prompt: request.original_prompt.clone(),
            transition: None,
            user_notification: None,
            snapshot_id: None,
            short_circuited: false,
            analysis: None,
            adaptation: None,
            error: Some(error),
            processed_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Recommendations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecommendationStatus {
    Ready,
    /// No recommendation could be produced; items are empty.
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaRecommendation {
    pub persona_id: String,
    pub persona_name: String,
    pub category: PersonaCategory,
    /// Compatibility score plus any thread-metadata boost, clamped.
    pub score: f64,
    pub confidence: f64,
    pub metadata_boost: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub thread_id: String,
    pub status: RecommendationStatus,
    pub items: Vec<PersonaRecommendation>,
    /// Confidence of the top item, 0 when unavailable.
    pub confidence: f64,
    pub generated_at: DateTime<Utc>,
}

impl RecommendationSet {
    pub fn unavailable(thread_id: &str, reason: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            status: RecommendationStatus::Unavailable { reason: reason.into() },
            items: Vec::new(),
            confidence: 0.0,
            generated_at: Utc::now(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == RecommendationStatus::Ready
    }
}

// ---------------------------------------------------------------------------
// Monitoring & analytics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringReport {
    pub thread_id: String,
    pub active_persona_id: String,
    pub status: ThreadStatus,
    pub performance: PerformanceTrend,
    pub consistency: ConsistencyAnalysis,
    pub opportunities: Vec<SwitchOpportunity>,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// How well executed switches worked out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwitchEffectiveness {
    /// Switches with a recorded impact.
    pub measured_switches: usize,
    pub positive_switches: usize,
    /// `positive / measured`, `None` before any measurement.
    pub success_rate: Option<f64>,
    pub average_impact: Option<f64>,
}

/// Aggregates across every tracked thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwitchingAnalytics {
    pub thread_count: usize,
    pub total_switches: usize,
    pub switches_per_thread: BTreeMap<String, usize>,
    pub trigger_histogram: BTreeMap<String, usize>,
    pub persona_usage: BTreeMap<String, usize>,
    pub effectiveness: SwitchEffectiveness,
    /// Mean context alignment of each thread's latest snapshot.
    pub average_alignment: Option<f64>,
    pub generated_at: Option<DateTime<Utc>>,
}
