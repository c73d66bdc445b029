//! Result types produced by the context analyzer.
//!
//! A [`ContextAnalysisResult`] is always freshly constructed; nothing in the
//! engine mutates one after the analyzer returns it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Intent
// ---------------------------------------------------------------------------

/// The closed set of conversation intents.
///
/// Declaration order is the tie-break order when two intents score equally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationIntent {
    InformationSeeking,
    ProblemSolving,
    CreativeWriting,
    TechnicalSupport,
    CasualConversation,
    Learning,
    Analysis,
    DecisionMaking,
    EmotionalSupport,
    Entertainment,
    Planning,
    Feedback,
}

impl ConversationIntent {
    /// Every intent in tie-break order.
    pub const ALL: [ConversationIntent; 12] = [
        Self::InformationSeeking,
        Self::ProblemSolving,
        Self::CreativeWriting,
        Self::TechnicalSupport,
        Self::CasualConversation,
        Self::Learning,
        Self::Analysis,
        Self::DecisionMaking,
        Self::EmotionalSupport,
        Self::Entertainment,
        Self::Planning,
        Self::Feedback,
    ];

    /// Snake-case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InformationSeeking => "information_seeking",
            Self::ProblemSolving => "problem_solving",
            Self::CreativeWriting => "creative_writing",
            Self::TechnicalSupport => "technical_support",
            Self::CasualConversation => "casual_conversation",
            Self::Learning => "learning",
            Self::Analysis => "analysis",
            Self::DecisionMaking => "decision_making",
            Self::EmotionalSupport => "emotional_support",
            Self::Entertainment => "entertainment",
            Self::Planning => "planning",
            Self::Feedback => "feedback",
        }
    }

    /// Whether the intent calls for technical or analytical depth.
    pub fn is_technical(&self) -> bool {
        matches!(self, Self::TechnicalSupport | Self::Analysis)
    }
}

impl std::fmt::Display for ConversationIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Topics & complexity
// ---------------------------------------------------------------------------

/// A ranked topic extracted from the recent conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicInfo {
    pub name: String,
    /// Relevance in `[0, 1]`, relative to the strongest topic.
    pub relevance: f64,
    pub keywords: Vec<String>,
}

/// Coarse complexity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
    Expert,
}

impl ComplexityLevel {
    /// Map a normalized complexity score onto a level.
    ///
    /// Thresholds are 0.15 / 0.30 / 0.50 (15 / 30 / 50 points out of 100).
    pub fn from_score(score: f64) -> Self {
        if score >= 0.50 {
            Self::Expert
        } else if score >= 0.30 {
            Self::High
        } else if score >= 0.15 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Snake-case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Expert => "expert",
        }
    }

    /// Whether the level is high or expert.
    pub fn is_demanding(&self) -> bool {
        matches!(self, Self::High | Self::Expert)
    }
}

/// Complexity assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityAnalysis {
    pub level: ComplexityLevel,
    /// Normalized score in `[0, 1]`.
    pub score: f64,
    /// Which heuristics fired.
    pub indicators: Vec<String>,
}

// ---------------------------------------------------------------------------
// Emotion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

/// A named emotion with its detection confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedEmotion {
    pub name: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalContext {
    pub sentiment: Sentiment,
    /// Intensity in `[0, 1]`.
    pub intensity: f64,
    pub emotions: Vec<DetectedEmotion>,
}

// ---------------------------------------------------------------------------
// User patterns
// ---------------------------------------------------------------------------

/// Tie-break order is declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationStyle {
    Formal,
    Casual,
    Technical,
    Emotional,
}

impl CommunicationStyle {
    pub const ALL: [CommunicationStyle; 4] =
        [Self::Formal, Self::Casual, Self::Technical, Self::Emotional];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Formal => "formal",
            Self::Casual => "casual",
            Self::Technical => "technical",
            Self::Emotional => "emotional",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    Concise,
    Moderate,
    Detailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpertiseLevel {
    Beginner,
    Intermediate,
    Expert,
}

/// Patterns inferred from user-authored messages only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPatterns {
    pub communication_style: CommunicationStyle,
    pub verbosity: Verbosity,
    pub expertise_level: ExpertiseLevel,
    pub interaction_preferences: Vec<String>,
}

// ---------------------------------------------------------------------------
// Switching triggers
// ---------------------------------------------------------------------------

/// A suggested change to a persona trait weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitAdjustment {
    pub trait_name: String,
    /// Signed weight delta.
    pub adjustment: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchingTriggers {
    pub should_switch: bool,
    /// `min(total / 100, 1)`.
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub suggested_trait_adjustments: Vec<TraitAdjustment>,
}

impl SwitchingTriggers {
    /// Triggers that did not fire.
    pub fn none() -> Self {
        Self {
            should_switch: false,
            confidence: 0.0,
            reasons: Vec::new(),
            suggested_trait_adjustments: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub analyzed_at: DateTime<Utc>,
    pub message_count: usize,
    pub user_message_count: usize,
    pub current_persona_id: Option<String>,
    pub session_topic: Option<String>,
    /// True when the analyzer recovered from an internal failure.
    pub fallback: bool,
}

/// Structured interpretation of a conversation excerpt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextAnalysisResult {
    pub intent: ConversationIntent,
    pub topics: Vec<TopicInfo>,
    pub complexity: ComplexityAnalysis,
    pub emotional_context: EmotionalContext,
    pub user_patterns: UserPatterns,
    pub switching_triggers: SwitchingTriggers,
    pub metadata: AnalysisMetadata,
}

impl ContextAnalysisResult {
    /// The fixed safe result returned when analysis fails.
    pub fn safe_default(message_count: usize, current_persona_id: Option<&str>) -> Self {
        Self {
            intent: ConversationIntent::CasualConversation,
            topics: vec![TopicInfo {
                name: "general".to_string(),
                relevance: 0.5,
                keywords: Vec::new(),
            }],
            complexity: ComplexityAnalysis {
                level: ComplexityLevel::Low,
                score: 0.0,
                indicators: Vec::new(),
            },
            emotional_context: EmotionalContext {
                sentiment: Sentiment::Neutral,
                intensity: 0.0,
                emotions: Vec::new(),
            },
            user_patterns: UserPatterns {
                communication_style: CommunicationStyle::Casual,
                verbosity: Verbosity::Moderate,
                expertise_level: ExpertiseLevel::Intermediate,
                interaction_preferences: Vec::new(),
            },
            switching_triggers: SwitchingTriggers::none(),
            metadata: AnalysisMetadata {
                analyzed_at: Utc::now(),
                message_count,
                user_message_count: 0,
                current_persona_id: current_persona_id.map(str::to_string),
                session_topic: None,
                fallback: true,
            },
        }
    }

    /// Names of the top `n` topics.
    pub fn topic_names(&self, n: usize) -> Vec<&str> {
        self.topics.iter().take(n).map(|t| t.name.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// Comparison & trends
// ---------------------------------------------------------------------------

/// What a change between two analyses suggests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextChangeAction {
    Maintain,
    Adapt,
    Switch,
}

/// Diff of two analyses of the same conversation at different points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisComparison {
    pub message_count_delta: i64,
    /// Labels that changed, e.g. `"intent: learning -> analysis"`.
    pub changes: Vec<String>,
    pub recommendation: ContextChangeAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// One sliding window of the trend extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSummary {
    /// Inclusive start message index.
    pub start: usize,
    /// Exclusive end message index.
    pub end: usize,
    pub intent: ConversationIntent,
    pub complexity_score: f64,
    pub sentiment: Sentiment,
    pub intensity: f64,
    pub should_switch: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub windows: Vec<WindowSummary>,
    pub complexity_direction: TrendDirection,
    pub dominant_intent: ConversationIntent,
    /// Whether sentiment changed between the first and last window.
    pub sentiment_shift: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_thresholds() {
        assert_eq!(ComplexityLevel::from_score(0.0), ComplexityLevel::Low);
        assert_eq!(ComplexityLevel::from_score(0.149), ComplexityLevel::Low);
        assert_eq!(ComplexityLevel::from_score(0.15), ComplexityLevel::Medium);
        assert_eq!(ComplexityLevel::from_score(0.30), ComplexityLevel::High);
        assert_eq!(ComplexityLevel::from_score(0.50), ComplexityLevel::Expert);
        assert_eq!(ComplexityLevel::from_score(1.0), ComplexityLevel::Expert);
    }

    #[test]
    fn test_intent_labels_are_snake_case() {
        for intent in ConversationIntent::ALL {
            let json = serde_json::to_string(&intent).unwrap();
            assert_eq!(json, format!("\"{}\"", intent.as_str()));
        }
    }

    #[test]
    fn test_safe_default_shape() {
        let r = ContextAnalysisResult::safe_default(3, Some("casual"));
        assert_eq!(r.intent, ConversationIntent::CasualConversation);
        assert_eq!(r.complexity.level, ComplexityLevel::Low);
        assert_eq!(r.emotional_context.sentiment, Sentiment::Neutral);
        assert!(!r.switching_triggers.should_switch);
        assert!(r.metadata.fallback);
        assert_eq!(r.metadata.current_persona_id.as_deref(), Some("casual"));
    }
}
