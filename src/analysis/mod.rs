//! Context analyzer: turns a message sequence into a [`ContextAnalysisResult`].
//!
//! # Pipeline
//!
//! ```text
//! messages ──┬─ intent       (keyword table, whole-word hits)
//!            ├─ topics       (chunking + tf-idf)
//!            ├─ complexity   (diversity, sentence length, technical terms, depth)
//!            ├─ emotion      (sentiment lexicon, named emotions)
//!            └─ user patterns (user-authored messages only)
//!                    │  join
//!                    ▼
//!             trigger synthesis ─▶ ContextAnalysisResult
//! ```
//!
//! The five sub-analyses share no mutable state and are awaited together.
//! Analysis fails soft: any internal fault yields
//! [`ContextAnalysisResult::safe_default`].

pub mod lexicon;
pub mod topics;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::types::{ConversationContext, Message};
use crate::utilities::string_utils::{clamp_unit, content_terms, split_sentences, tokenize};

pub use lexicon::{AnalyzerLexicon, CompiledLexicon, DEFAULT_LEXICON};
pub use types::*;

/// Messages considered for topic extraction.
const TOPIC_WINDOW: usize = 10;
/// Default window for [`ContextAnalyzer::analyze_trends`].
pub const DEFAULT_TREND_WINDOW: usize = 5;

// Trigger weights, out of 100.
const TRIGGER_TECHNICAL_INTENT: f64 = 30.0;
const TRIGGER_HIGH_COMPLEXITY: f64 = 25.0;
const TRIGGER_EMOTIONAL_INTENSITY: f64 = 20.0;
const TRIGGER_FORMAL_STYLE: f64 = 15.0;
const TRIGGER_TECHNICAL_TOPIC: f64 = 20.0;
const TRIGGER_THRESHOLD: f64 = 40.0;

/// Internal analysis faults. Never leaves this module.
#[derive(Debug, Error)]
enum AnalysisError {
    #[error("conversation has no non-empty messages")]
    EmptyConversation,
    #[error("non-finite score in {field}")]
    NonFiniteScore { field: &'static str },
}

/// Heuristic conversation analyzer.
#[derive(Debug, Clone)]
pub struct ContextAnalyzer {
    lexicon: Arc<CompiledLexicon>,
}

impl Default for ContextAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextAnalyzer {
    /// Analyzer using the built-in lexicon.
    pub fn new() -> Self {
        Self {
            lexicon: Arc::clone(&DEFAULT_LEXICON),
        }
    }

    /// Analyzer using a custom lexicon.
    pub fn with_lexicon(lexicon: &AnalyzerLexicon) -> Result<Self, regex::Error> {
        Ok(Self {
            lexicon: Arc::new(lexicon.compile()?),
        })
    }

    /// The compiled lexicon in use.
    pub fn lexicon(&self) -> &CompiledLexicon {
        &self.lexicon
    }

    // -----------------------------------------------------------------------
    // Entry point
    // -----------------------------------------------------------------------

    /// Analyze a conversation. Never fails; see the module docs.
    pub async fn analyze(
        &self,
        messages: &[Message],
        context: Option<&ConversationContext>,
        current_persona_id: Option<&str>,
    ) -> ContextAnalysisResult {
        match self.try_analyze(messages, context, current_persona_id).await {
            Ok(result) => result,
            Err(e) => {
                log::warn!(
                    "Context analysis failed ({}), using safe default for {} messages",
                    e,
                    messages.len()
                );
                ContextAnalysisResult::safe_default(messages.len(), current_persona_id)
            }
        }
    }

    async fn try_analyze(
        &self,
        messages: &[Message],
        context: Option<&ConversationContext>,
        current_persona_id: Option<&str>,
    ) -> Result<ContextAnalysisResult, AnalysisError> {
        if messages.iter().all(|m| m.content.trim().is_empty()) {
            return Err(AnalysisError::EmptyConversation);
        }

        let user_messages: Vec<&Message> = messages.iter().filter(|m| m.is_user()).collect();
        let session_topic = context.and_then(|c| c.topic.clone());

        let (intent, mut topics, complexity, emotional_context, user_patterns) = futures::join!(
            async { self.detect_intent(messages) },
            async { self.extract_topics(messages) },
            async { self.assess_complexity(messages) },
            async { self.analyze_emotion(messages) },
            async { self.analyze_user_patterns(&user_messages) },
        );

        if let Some(topic) = session_topic.as_deref() {
            prepend_session_topic(&mut topics, topic);
        }

        validate_finite("complexity", complexity.score)?;
        validate_finite("emotion", emotional_context.intensity)?;

        let switching_triggers = self.synthesize_triggers(
            intent,
            &topics,
            &complexity,
            &emotional_context,
            &user_patterns,
        );
        validate_finite("triggers", switching_triggers.confidence)?;

        log::debug!(
            "Analyzed {} messages: intent={}, complexity={}, sentiment={}, should_switch={}",
            messages.len(),
            intent,
            complexity.level.as_str(),
            emotional_context.sentiment.as_str(),
            switching_triggers.should_switch,
        );

        Ok(ContextAnalysisResult {
            intent,
            topics,
            complexity,
            emotional_context,
            user_patterns,
            switching_triggers,
            metadata: AnalysisMetadata {
                analyzed_at: Utc::now(),
                message_count: messages.len(),
                user_message_count: user_messages.len(),
                current_persona_id: current_persona_id.map(str::to_string),
                session_topic,
                fallback: false,
            },
        })
    }

    // -----------------------------------------------------------------------
    // Sub-analyses
    // -----------------------------------------------------------------------

    /// Highest keyword-hit intent; all-zero defaults to casual conversation.
    fn detect_intent(&self, messages: &[Message]) -> ConversationIntent {
        let text = joined_text(messages.iter());
        let mut best = ConversationIntent::CasualConversation;
        let mut best_hits = 0;

        for intent in ConversationIntent::ALL {
            let hits: usize = self
                .lexicon
                .intents
                .iter()
                .filter(|(i, _)| *i == intent)
                .map(|(_, matcher)| matcher.count(&text))
                .sum();
            if hits > best_hits {
                best = intent;
                best_hits = hits;
            }
        }
        best
    }

    fn extract_topics(&self, messages: &[Message]) -> Vec<TopicInfo> {
        let skip = messages.len().saturating_sub(TOPIC_WINDOW);
        let recent = messages[skip..]
            .iter()
            .map(|m| m.content.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        topics::extract_topics(&recent)
    }

    fn assess_complexity(&self, messages: &[Message]) -> ComplexityAnalysis {
        let text = joined_text(messages.iter());
        let tokens = tokenize(&text);
        let mut raw = 0.0;
        let mut indicators = Vec::new();

        if !tokens.is_empty() {
            let unique: HashSet<&String> = tokens.iter().collect();
            let diversity = unique.len() as f64 / tokens.len() as f64;
            if diversity > 0.7 {
                raw += 20.0;
                indicators.push(format!("high vocabulary diversity ({diversity:.2})"));
            }
        }

        let sentences: Vec<String> = messages
            .iter()
            .flat_map(|m| split_sentences(&m.content))
            .collect();
        if !sentences.is_empty() {
            let words: usize = sentences.iter().map(|s| tokenize(s).len()).sum();
            let mean = words as f64 / sentences.len() as f64;
            if mean > 20.0 {
                raw += 15.0;
                indicators.push(format!("long sentences ({mean:.1} words on average)"));
            }
        }

        let technical_hits = self.lexicon.technical.count(&text);
        if technical_hits >= 3 {
            raw += 25.0;
            indicators.push(format!("technical vocabulary ({technical_hits} terms)"));
        }

        if messages.len() > 10 {
            raw += 10.0;
            indicators.push(format!("deep conversation ({} messages)", messages.len()));
        }

        let score = clamp_unit(raw / 100.0);
        ComplexityAnalysis {
            level: ComplexityLevel::from_score(score),
            score,
            indicators,
        }
    }

    fn analyze_emotion(&self, messages: &[Message]) -> EmotionalContext {
        let text = joined_text(messages.iter());
        let positive = self.lexicon.positive.count(&text);
        let negative = self.lexicon.negative.count(&text);

        let sentiment = match positive.cmp(&negative) {
            std::cmp::Ordering::Greater => Sentiment::Positive,
            std::cmp::Ordering::Less => Sentiment::Negative,
            std::cmp::Ordering::Equal => Sentiment::Neutral,
        };
        let intensity = ((positive + negative) as f64 / 10.0).min(1.0);

        let emotions = self
            .lexicon
            .emotions
            .iter()
            .filter_map(|(name, matcher)| {
                let hits = matcher.count(&text);
                (hits > 0).then(|| DetectedEmotion {
                    name: name.clone(),
                    confidence: (hits as f64 / 10.0).min(1.0),
                })
            })
            .collect();

        EmotionalContext {
            sentiment,
            intensity,
            emotions,
        }
    }

    fn analyze_user_patterns(&self, user_messages: &[&Message]) -> UserPatterns {
        let text = joined_text(user_messages.iter().copied());

        let mut communication_style = CommunicationStyle::Casual;
        let mut best = 0;
        for style in CommunicationStyle::ALL {
            let hits: usize = self
                .lexicon
                .styles
                .iter()
                .filter(|(s, _)| *s == style)
                .map(|(_, matcher)| matcher.count(&text))
                .sum();
            if hits > best {
                best = hits;
                communication_style = style;
            }
        }

        let verbosity = if user_messages.is_empty() {
            Verbosity::Moderate
        } else {
            let total: usize = user_messages.iter().map(|m| m.content.chars().count()).sum();
            let mean = total as f64 / user_messages.len() as f64;
            if mean < 50.0 {
                Verbosity::Concise
            } else if mean <= 200.0 {
                Verbosity::Moderate
            } else {
                Verbosity::Detailed
            }
        };

        let expert = self.lexicon.expert.count(&text);
        let beginner = self.lexicon.beginner.count(&text);
        let expertise_level = match expert.cmp(&beginner) {
            std::cmp::Ordering::Greater => ExpertiseLevel::Expert,
            std::cmp::Ordering::Less => ExpertiseLevel::Beginner,
            std::cmp::Ordering::Equal => ExpertiseLevel::Intermediate,
        };

        let interaction_preferences = self
            .lexicon
            .preferences
            .iter()
            .filter(|(_, matcher)| matcher.is_match(&text))
            .map(|(name, _)| name.clone())
            .collect();

        UserPatterns {
            communication_style,
            verbosity,
            expertise_level,
            interaction_preferences,
        }
    }

    // -----------------------------------------------------------------------
    // Trigger synthesis
    // -----------------------------------------------------------------------

    fn synthesize_triggers(
        &self,
        intent: ConversationIntent,
        topics: &[TopicInfo],
        complexity: &ComplexityAnalysis,
        emotion: &EmotionalContext,
        patterns: &UserPatterns,
    ) -> SwitchingTriggers {
        let mut total = 0.0;
        let mut reasons = Vec::new();
        let mut adjustments = Vec::new();

        let mut fire = |weight: f64, reason: String, trait_name: &str| {
            total += weight;
            adjustments.push(TraitAdjustment {
                trait_name: trait_name.to_string(),
                adjustment: weight / 100.0,
                reason: reason.clone(),
            });
            reasons.push(reason);
        };

        if intent.is_technical() {
            fire(
                TRIGGER_TECHNICAL_INTENT,
                format!("{intent} intent calls for technical depth"),
                "technical_depth",
            );
        }
        if complexity.level.is_demanding() {
            fire(
                TRIGGER_HIGH_COMPLEXITY,
                format!("{} conversation complexity", complexity.level.as_str()),
                "expertise_level",
            );
        }
        if emotion.intensity > 0.7 {
            fire(
                TRIGGER_EMOTIONAL_INTENSITY,
                format!("strong emotional intensity ({:.2})", emotion.intensity),
                "empathy",
            );
        }
        if patterns.communication_style == CommunicationStyle::Formal {
            fire(
                TRIGGER_FORMAL_STYLE,
                "formal communication style".to_string(),
                "formality",
            );
        }
        let technical_topics: Vec<&str> = topics
            .iter()
            .filter(|t| self.lexicon.is_technical_term(&t.name))
            .map(|t| t.name.as_str())
            .collect();
        if !technical_topics.is_empty() {
            fire(
                TRIGGER_TECHNICAL_TOPIC,
                format!("technical topics: {}", technical_topics.join(", ")),
                "domain_knowledge",
            );
        }

        SwitchingTriggers {
            should_switch: total >= TRIGGER_THRESHOLD,
            confidence: clamp_unit(total / 100.0),
            reasons,
            suggested_trait_adjustments: adjustments,
        }
    }

    // -----------------------------------------------------------------------
    // Comparison & trends
    // -----------------------------------------------------------------------

    /// Diff two analyses: 0 changed labels → maintain, ≤2 → adapt, else switch.
    pub fn compare(
        &self,
        previous: &ContextAnalysisResult,
        current: &ContextAnalysisResult,
    ) -> AnalysisComparison {
        let mut changes = Vec::new();
        let mut note = |label: &str, before: &str, after: &str| {
            if before != after {
                changes.push(format!("{label}: {before} -> {after}"));
            }
        };

        note("intent", previous.intent.as_str(), current.intent.as_str());
        note(
            "complexity",
            previous.complexity.level.as_str(),
            current.complexity.level.as_str(),
        );
        note(
            "sentiment",
            previous.emotional_context.sentiment.as_str(),
            current.emotional_context.sentiment.as_str(),
        );
        note(
            "style",
            previous.user_patterns.communication_style.as_str(),
            current.user_patterns.communication_style.as_str(),
        );
        let prev_topic = previous.topics.first().map(|t| t.name.as_str()).unwrap_or("");
        let curr_topic = current.topics.first().map(|t| t.name.as_str()).unwrap_or("");
        note("topic", prev_topic, curr_topic);

        let recommendation = match changes.len() {
            0 => ContextChangeAction::Maintain,
            1..=2 => ContextChangeAction::Adapt,
            _ => ContextChangeAction::Switch,
        };

        AnalysisComparison {
            message_count_delta: current.metadata.message_count as i64
                - previous.metadata.message_count as i64,
            changes,
            recommendation,
        }
    }

    /// Analyze consecutive sliding windows (stride 1) of `window` messages.
    ///
    /// Conversations shorter than the window yield a single window.
    pub async fn analyze_trends(&self, messages: &[Message], window: usize) -> TrendReport {
        let window = window.max(1);
        let mut windows = Vec::new();

        let last_start = messages.len().saturating_sub(window);
        for start in 0..=last_start {
            let end = (start + window).min(messages.len());
            let analysis = self.analyze(&messages[start..end], None, None).await;
            windows.push(WindowSummary {
                start,
                end,
                intent: analysis.intent,
                complexity_score: analysis.complexity.score,
                sentiment: analysis.emotional_context.sentiment,
                intensity: analysis.emotional_context.intensity,
                should_switch: analysis.switching_triggers.should_switch,
            });
        }

        let complexity_direction = match (windows.first(), windows.last()) {
            (Some(first), Some(last)) => {
                let delta = last.complexity_score - first.complexity_score;
                if delta > 0.05 {
                    TrendDirection::Increasing
                } else if delta < -0.05 {
                    TrendDirection::Decreasing
                } else {
                    TrendDirection::Stable
                }
            }
            _ => TrendDirection::Stable,
        };

        let dominant_intent = ConversationIntent::ALL
            .iter()
            .copied()
            .map(|intent| (intent, windows.iter().filter(|w| w.intent == intent).count()))
            .fold((ConversationIntent::CasualConversation, 0), |best, (intent, n)| {
                if n > best.1 {
                    (intent, n)
                } else {
                    best
                }
            })
            .0;

        let sentiment_shift = match (windows.first(), windows.last()) {
            (Some(first), Some(last)) => first.sentiment != last.sentiment,
            _ => false,
        };

        TrendReport {
            windows,
            complexity_direction,
            dominant_intent,
            sentiment_shift,
        }
    }
}

fn joined_text<'a>(messages: impl Iterator<Item = &'a Message>) -> String {
    messages
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn prepend_session_topic(topics: &mut Vec<TopicInfo>, topic: &str) {
    let name = topic.trim().to_lowercase();
    if name.is_empty() {
        return;
    }
    topics.retain(|t| t.name != name && t.name != "general");
    topics.insert(
        0,
        TopicInfo {
            keywords: content_terms(&name),
            name,
            relevance: 1.0,
        },
    );
    topics.truncate(topics::MAX_TOPICS);
}

fn validate_finite(field: &'static str, value: f64) -> Result<(), AnalysisError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(AnalysisError::NonFiniteScore { field })
    }
}
