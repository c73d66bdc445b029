//! Switching orchestrator: decides whether a thread should change persona.
//!
//! Each thread runs a small state machine:
//!
//! ```text
//! Stable ──trigger──▶ Evaluating ──rejected──▶ Stable
//!                          │
//!                       approved
//!                          ▼
//!                    Transitioning ──injected──▶ Stable
//! ```
//!
//! Policy gates (switch limit, cooldown) run before analysis so that a gated
//! thread costs one persona lookup and nothing else.

pub mod config;
pub mod types;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;

use crate::analysis::{ContextAnalysisResult, ContextAnalyzer};
use crate::interfaces::{InjectionRequest, PersonaStore, PromptInjector};
use crate::scoring::{CompatibilityScorer, RankOptions};
use crate::types::{ConversationContext, Message, PersonaDefinition};
use crate::utilities::errors::SwitchError;
use crate::utilities::string_utils::clamp_unit;

pub use config::SwitchingConfig;
pub use types::*;

/// Alternatives considered per decision.
const MAX_ALTERNATIVES: usize = 5;
/// Improvement above which a switch is immediate and a full personality switch.
const MAJOR_IMPROVEMENT: f64 = 0.3;
/// Monitoring sweep window.
pub const OPPORTUNITY_WINDOW: usize = 5;

/// Runs the switching policy and executes approved switches.
pub struct SwitchingOrchestrator {
    analyzer: ContextAnalyzer,
    scorer: CompatibilityScorer,
    store: Arc<dyn PersonaStore>,
    injector: Arc<dyn PromptInjector>,
    default_config: SwitchingConfig,
    threads: DashMap<String, ThreadSwitchState>,
}

impl SwitchingOrchestrator {
    pub fn new(
        analyzer: ContextAnalyzer,
        store: Arc<dyn PersonaStore>,
        injector: Arc<dyn PromptInjector>,
    ) -> Self {
        Self {
            analyzer,
            scorer: CompatibilityScorer::new(Arc::clone(&store)),
            store,
            injector,
            default_config: SwitchingConfig::default(),
            threads: DashMap::new(),
        }
    }

    /// Builder: replace the config used when a call passes none.
    pub fn with_default_config(mut self, config: SwitchingConfig) -> Self {
        self.default_config = config;
        self
    }

    pub fn default_config(&self) -> &SwitchingConfig {
        &self.default_config
    }

    pub fn scorer(&self) -> &CompatibilityScorer {
        &self.scorer
    }

    pub fn analyzer(&self) -> &ContextAnalyzer {
        &self.analyzer
    }

    // -----------------------------------------------------------------------
    // Decide
    // -----------------------------------------------------------------------

    /// Analyze the conversation and decide whether to switch.
    ///
    /// Without a `thread_id` the decision is stateless: no gates apply.
    /// Never leaves the thread in [`SwitchPhase::Transitioning`].
    pub async fn decide(
        &self,
        messages: &[Message],
        current_persona_id: &str,
        context: Option<&ConversationContext>,
        thread_id: Option<&str>,
        config: Option<&SwitchingConfig>,
    ) -> Result<SwitchingDecision, SwitchError> {
        self.evaluate(None, messages, current_persona_id, context, thread_id, config)
            .await
            .map(|(_, decision)| decision)
    }

    /// Decide from an analysis the caller already has. Policy gates apply.
    pub async fn decide_with_analysis(
        &self,
        analysis: ContextAnalysisResult,
        current_persona_id: &str,
        thread_id: Option<&str>,
        config: Option<&SwitchingConfig>,
    ) -> Result<SwitchingDecision, SwitchError> {
        self.evaluate(Some(analysis), &[], current_persona_id, None, thread_id, config)
            .await
            .map(|(_, decision)| decision)
    }

    /// Resolve the current persona, apply the gates and decide. Analyzes
    /// `messages` only when no analysis is supplied and no gate applies.
    async fn evaluate(
        &self,
        analysis: Option<ContextAnalysisResult>,
        messages: &[Message],
        current_persona_id: &str,
        context: Option<&ConversationContext>,
        thread_id: Option<&str>,
        config: Option<&SwitchingConfig>,
    ) -> Result<(PersonaDefinition, SwitchingDecision), SwitchError> {
        let config = config.unwrap_or(&self.default_config);
        let current = self.store.find_one(current_persona_id).await?;

        if let Some(decision) = self.gate(&current, thread_id, config) {
            return Ok((current, decision));
        }

        self.set_phase(thread_id, SwitchPhase::Evaluating);
        let analysis = match analysis {
            Some(analysis) => analysis,
            None => {
                self.analyzer
                    .analyze(messages, context, Some(current_persona_id))
                    .await
            }
        };
        let decision = self.decide_on(&current, analysis, thread_id, config).await;
        self.set_phase(thread_id, SwitchPhase::Stable);
        Ok((current, decision?))
    }

    /// Switch-limit and cooldown gates. `Some` short-circuits the decision.
    fn gate(
        &self,
        current: &PersonaDefinition,
        thread_id: Option<&str>,
        config: &SwitchingConfig,
    ) -> Option<SwitchingDecision> {
        let reason = if !config.enabled {
            Some("Switching is disabled for this thread".to_string())
        } else if let Some(thread_id) = thread_id {
            let state = self.threads.get(thread_id).map(|s| s.value().clone()).unwrap_or_default();
            if state.switch_count >= config.max_switches_per_conversation {
                Some(format!(
                    "Maximum switches per conversation reached ({}/{})",
                    state.switch_count, config.max_switches_per_conversation
                ))
            } else {
                let remaining = cooldown_remaining(&state, config);
                (remaining > 0).then(|| format!("Cooldown active: {remaining}s remaining"))
            }
        } else {
            None
        };

        let reason = reason?;
        log::debug!(
            "Switch gated for thread {}: {}",
            thread_id.unwrap_or("-"),
            reason
        );
        Some(SwitchingDecision {
            should_switch: false,
            current_persona: PersonaSnapshot::of(current, None),
            recommended: None,
            confidence: 1.0,
            reasoning: DecisionReasoning {
                summary: reason.clone(),
                gate: Some(reason),
                ..Default::default()
            },
            strategy: SwitchingStrategy::hold(),
            metadata: DecisionMetadata {
                thread_id: thread_id.map(str::to_string),
                decided_at: Utc::now(),
                switch_count: self.switch_count(thread_id),
                alternatives_considered: 0,
                analysis: None,
            },
        })
    }

    async fn decide_on(
        &self,
        current: &PersonaDefinition,
        analysis: ContextAnalysisResult,
        thread_id: Option<&str>,
        config: &SwitchingConfig,
    ) -> Result<SwitchingDecision, SwitchError> {
        let current_score = self.scorer.score_persona(current, &analysis);
        let ranked = self
            .scorer
            .rank(
                &analysis,
                None,
                RankOptions {
                    confidence_threshold: 0.0,
                    max_results: MAX_ALTERNATIVES + 1,
                },
            )
            .await?;
        let alternatives: Vec<_> = ranked
            .into_iter()
            .filter(|r| r.persona_id != current.id)
            .take(MAX_ALTERNATIVES)
            .collect();

        let mut factors = vec![format!(
            "current persona {} scores {:.2}",
            current.id, current_score.overall
        )];

        let mut recommended = None;
        let mut should_switch = false;
        let mut priority_traits = Vec::new();

        if let Some(best) = alternatives.first() {
            let improvement = best.score.overall - current_score.overall;
            factors.push(format!(
                "best alternative {} scores {:.2} (confidence {:.2}, improvement {:+.2})",
                best.persona_id, best.score.overall, best.score.confidence, improvement
            ));

            let improves = improvement >= config.min_improvement;
            let confident = best.score.confidence >= config.confidence_threshold;
            if !improves {
                factors.push(format!(
                    "improvement below required {:.2}",
                    config.min_improvement
                ));
            }
            if !confident {
                factors.push(format!(
                    "confidence below threshold {:.2}",
                    config.confidence_threshold
                ));
            }
            should_switch = improves && confident;

            if should_switch {
                priority_traits = best.score.rationale.matching_traits.clone();
                recommended = Some(RecommendedPersona {
                    persona: PersonaSnapshot {
                        id: best.persona_id.clone(),
                        name: best.persona_name.clone(),
                        category: best.category,
                        score: Some(best.score.overall),
                    },
                    confidence: best.score.confidence,
                    improvement: clamp_unit(improvement),
                });
            }
        } else {
            factors.push("no alternative personas available".to_string());
        }

        if priority_traits.is_empty() {
            priority_traits = analysis
                .switching_triggers
                .suggested_trait_adjustments
                .iter()
                .map(|a| a.trait_name.clone())
                .collect();
        }

        let strategy = match &recommended {
            Some(rec) => SwitchingStrategy {
                intensity: if rec.improvement > MAJOR_IMPROVEMENT {
                    SwitchIntensity::Immediate
                } else {
                    SwitchIntensity::Moderate
                },
                priority_traits,
                approach: if config.notify_user {
                    SwitchApproach::Acknowledged
                } else {
                    SwitchApproach::Seamless
                },
            },
            None => SwitchingStrategy {
                priority_traits,
                ..SwitchingStrategy::hold()
            },
        };

        let summary = match &recommended {
            Some(rec) => format!(
                "Switch from {} to {} for {} context",
                current.id, rec.persona.id, analysis.intent
            ),
            None => format!("Keep {} for {} context", current.id, analysis.intent),
        };
        let confidence = recommended
            .as_ref()
            .map(|r| r.confidence)
            .unwrap_or(current_score.confidence);

        if should_switch {
            log::info!("{} (thread {})", summary, thread_id.unwrap_or("-"));
        } else {
            log::debug!("{} (thread {})", summary, thread_id.unwrap_or("-"));
        }

        Ok(SwitchingDecision {
            should_switch,
            current_persona: PersonaSnapshot::of(current, Some(current_score.overall)),
            recommended,
            confidence: clamp_unit(confidence),
            reasoning: DecisionReasoning {
                summary,
                triggers: analysis.switching_triggers.reasons.clone(),
                factors,
                gate: None,
            },
            strategy,
            metadata: DecisionMetadata {
                thread_id: thread_id.map(str::to_string),
                decided_at: Utc::now(),
                switch_count: self.switch_count(thread_id),
                alternatives_considered: alternatives.len(),
                analysis: Some(analysis),
            },
        })
    }

    // -----------------------------------------------------------------------
    // Adapt
    // -----------------------------------------------------------------------

    /// Decide and, when warranted, adapt: either adjust the current persona's
    /// trait weights or switch to the recommended persona.
    ///
    /// An unknown persona yields an unchanged result; injection failures are
    /// returned as errors and leave thread state untouched.
    pub async fn adapt(
        &self,
        messages: &[Message],
        current_persona_id: &str,
        context: Option<&ConversationContext>,
        thread_id: Option<&str>,
        config: Option<&SwitchingConfig>,
        original_prompt: &str,
    ) -> Result<AdaptationResult, SwitchError> {
        let evaluated = self
            .evaluate(None, messages, current_persona_id, context, thread_id, config)
            .await;
        self.adapt_from(evaluated, messages, current_persona_id, thread_id, config, original_prompt)
            .await
    }

    /// [`Self::adapt`] from an analysis the caller already has.
    pub async fn adapt_with_analysis(
        &self,
        analysis: ContextAnalysisResult,
        messages: &[Message],
        current_persona_id: &str,
        thread_id: Option<&str>,
        config: Option<&SwitchingConfig>,
        original_prompt: &str,
    ) -> Result<AdaptationResult, SwitchError> {
        let evaluated = self
            .evaluate(Some(analysis), messages, current_persona_id, None, thread_id, config)
            .await;
        self.adapt_from(evaluated, messages, current_persona_id, thread_id, config, original_prompt)
            .await
    }

    async fn adapt_from(
        &self,
        evaluated: Result<(PersonaDefinition, SwitchingDecision), SwitchError>,
        messages: &[Message],
        current_persona_id: &str,
        thread_id: Option<&str>,
        config: Option<&SwitchingConfig>,
        original_prompt: &str,
    ) -> Result<AdaptationResult, SwitchError> {
        let config = config.unwrap_or(&self.default_config);

        let (current, decision) = match evaluated {
            Ok(evaluated) => evaluated,
            Err(SwitchError::Lookup(e)) => {
                log::warn!(
                    "Persona lookup failed for thread {}: {}",
                    thread_id.unwrap_or("-"),
                    e
                );
                return Ok(AdaptationResult::unchanged(
                    PersonaState::unresolved(current_persona_id),
                    thread_id,
                    vec![e.to_string()],
                    None,
                    Some(e.to_string()),
                ));
            }
            Err(e) => return Err(e),
        };

        let current_state = PersonaState::of(&current);

        if decision.should_switch {
            return self
                .execute_switch(decision, &current, messages, thread_id, config, original_prompt)
                .await;
        }

        let adjustments = decision
            .metadata
            .analysis
            .as_ref()
            .filter(|a| !a.switching_triggers.reasons.is_empty())
            .map(|a| a.switching_triggers.suggested_trait_adjustments.clone())
            .unwrap_or_default();

        if adjustments.is_empty() {
            let rationale = vec![decision.reasoning.summary.clone()];
            return Ok(AdaptationResult::unchanged(
                current_state,
                thread_id,
                rationale,
                Some(decision),
                None,
            ));
        }

        // Triggers fired but no better persona: nudge the current one.
        let mut new_state = current_state.clone();
        let mut deltas = Vec::new();
        for adj in &adjustments {
            let name = adj.trait_name.to_lowercase();
            let from = current_state.trait_weights.get(&name).copied().unwrap_or(0.0);
            let to = clamp_unit(from + adj.adjustment);
            if (to - from).abs() > f64::EPSILON {
                new_state.trait_weights.insert(name.clone(), to);
                deltas.push(TraitDelta::new(name, from, to));
            }
        }

        let enhanced = self
            .inject(&current.id, &deltas, messages, config, original_prompt)
            .await?;

        let mut rationale = vec![format!(
            "Adjusted {} trait(s) on {} instead of switching",
            deltas.len(),
            current.id
        )];
        rationale.extend(adjustments.iter().map(|a| a.reason.clone()));

        log::debug!(
            "Trait adjustment on {} for thread {}: {} deltas",
            current.id,
            thread_id.unwrap_or("-"),
            deltas.len()
        );

        Ok(AdaptationResult {
            adapted: !deltas.is_empty(),
            adaptation_type: AdaptationType::TraitAdjustment,
            previous_state: current_state,
            new_state,
            trait_deltas: deltas,
            enhanced_prompt: Some(enhanced),
            rationale,
            user_notification: None,
            confidence: decision.confidence,
            decision: Some(decision),
            metadata: AdaptationMetadata {
                thread_id: thread_id.map(str::to_string),
                adapted_at: Utc::now(),
                error: None,
            },
        })
    }

    async fn execute_switch(
        &self,
        decision: SwitchingDecision,
        current: &PersonaDefinition,
        messages: &[Message],
        thread_id: Option<&str>,
        config: &SwitchingConfig,
        original_prompt: &str,
    ) -> Result<AdaptationResult, SwitchError> {
        let Some(recommended) = decision.recommended.clone() else {
            return Err(SwitchError::InvalidArgument(
                "approved decision without a recommended persona".to_string(),
            ));
        };
        let target = self.store.find_one(&recommended.persona.id).await?;

        let adaptation_type = if recommended.improvement > MAJOR_IMPROVEMENT {
            AdaptationType::PersonalitySwitch
        } else {
            AdaptationType::Hybrid
        };

        let previous_state = PersonaState::of(current);
        let mut new_state = PersonaState::of(&target);
        let names: BTreeSet<String> = previous_state
            .trait_weights
            .keys()
            .chain(new_state.trait_weights.keys())
            .cloned()
            .collect();

        let mut deltas = Vec::new();
        for name in names {
            let from = previous_state.trait_weights.get(&name).copied().unwrap_or(0.0);
            let target_weight = new_state.trait_weights.get(&name).copied().unwrap_or(0.0);
            let to = match adaptation_type {
                AdaptationType::Hybrid => (from + target_weight) / 2.0,
                _ => target_weight,
            };
            if (to - from).abs() > f64::EPSILON {
                deltas.push(TraitDelta::new(name.clone(), from, to));
            }
            if to > 0.0 {
                new_state.trait_weights.insert(name, to);
            }
        }

        self.set_phase(thread_id, SwitchPhase::Transitioning);
        let enhanced = match self
            .inject(&target.id, &deltas, messages, config, original_prompt)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                self.set_phase(thread_id, SwitchPhase::Stable);
                return Err(e);
            }
        };

        if let Some(thread_id) = thread_id {
            let mut state = self.threads.entry(thread_id.to_string()).or_default();
            state.switch_count += 1;
            state.last_switch_at = Some(Utc::now());
            state.phase = SwitchPhase::Stable;
            state.history.push(SwitchRecord {
                from_persona_id: current.id.clone(),
                to_persona_id: target.id.clone(),
                switched_at: Utc::now(),
                improvement: recommended.improvement,
                adaptation_type,
                reasons: decision.reasoning.triggers.clone(),
            });
        }

        log::info!(
            "Switched thread {} from {} to {} ({})",
            thread_id.unwrap_or("-"),
            current.id,
            target.id,
            adaptation_type.as_str()
        );

        let user_notification = config.notify_user.then(|| {
            let intent = decision
                .intent()
                .map(|i| i.as_str().replace('_', " "))
                .unwrap_or_else(|| "current".to_string());
            format!(
                "I'm switching to {} to better match this {} conversation.",
                target.name, intent
            )
        });

        let mut rationale = vec![decision.reasoning.summary.clone()];
        rationale.extend(decision.reasoning.triggers.iter().cloned());

        Ok(AdaptationResult {
            adapted: true,
            adaptation_type,
            previous_state,
            new_state,
            trait_deltas: deltas,
            enhanced_prompt: Some(enhanced),
            rationale,
            user_notification,
            confidence: decision.confidence,
            decision: Some(decision),
            metadata: AdaptationMetadata {
                thread_id: thread_id.map(str::to_string),
                adapted_at: Utc::now(),
                error: None,
            },
        })
    }

    async fn inject(
        &self,
        persona_id: &str,
        deltas: &[TraitDelta],
        messages: &[Message],
        config: &SwitchingConfig,
        original_prompt: &str,
    ) -> Result<String, SwitchError> {
        let mut context_variables = HashMap::new();
        let adjustments: serde_json::Map<String, Value> = deltas
            .iter()
            .map(|d| (d.trait_name.clone(), Value::from(d.to)))
            .collect();
        context_variables.insert("trait_adjustments".to_string(), Value::Object(adjustments));

        let request = InjectionRequest {
            original_prompt: original_prompt.to_string(),
            persona_id: persona_id.to_string(),
            context_variables,
            history: config.preserve_context.then(|| messages.to_vec()),
        };
        let result = self.injector.inject(request).await?;
        Ok(result.enhanced_prompt)
    }

    // -----------------------------------------------------------------------
    // Monitoring sweep
    // -----------------------------------------------------------------------

    /// Slide a window of [`OPPORTUNITY_WINDOW`] messages over the history and
    /// report windows whose triggers fired. Commits nothing.
    pub async fn find_opportunities(
        &self,
        messages: &[Message],
        current_persona_id: &str,
        thread_id: Option<&str>,
    ) -> Result<Vec<SwitchOpportunity>, SwitchError> {
        let mut opportunities = Vec::new();
        let last_start = messages.len().saturating_sub(OPPORTUNITY_WINDOW);

        for start in 0..=last_start {
            let end = (start + OPPORTUNITY_WINDOW).min(messages.len());
            if start >= end {
                break;
            }
            let analysis = self
                .analyzer
                .analyze(&messages[start..end], None, Some(current_persona_id))
                .await;
            if !analysis.switching_triggers.should_switch {
                continue;
            }
            let ranked = self
                .scorer
                .rank(
                    &analysis,
                    None,
                    RankOptions {
                        confidence_threshold: 0.0,
                        max_results: 2,
                    },
                )
                .await?;
            let suggested_persona_id = ranked
                .into_iter()
                .map(|r| r.persona_id)
                .find(|id| id != current_persona_id);

            opportunities.push(SwitchOpportunity {
                start,
                end,
                intent: analysis.intent,
                confidence: analysis.switching_triggers.confidence,
                reasons: analysis.switching_triggers.reasons,
                suggested_persona_id,
            });
        }

        log::debug!(
            "Found {} switch opportunities in {} messages (thread {})",
            opportunities.len(),
            messages.len(),
            thread_id.unwrap_or("-")
        );
        Ok(opportunities)
    }

    // -----------------------------------------------------------------------
    // Thread state
    // -----------------------------------------------------------------------

    pub fn thread_state(&self, thread_id: &str) -> Option<ThreadSwitchState> {
        self.threads.get(thread_id).map(|s| s.value().clone())
    }

    pub fn thread_status(&self, thread_id: &str, config: Option<&SwitchingConfig>) -> ThreadStatus {
        let config = config.unwrap_or(&self.default_config);
        let state = self.thread_state(thread_id).unwrap_or_default();
        ThreadStatus {
            thread_id: thread_id.to_string(),
            phase: state.phase,
            switch_count: state.switch_count,
            max_switches: config.max_switches_per_conversation,
            last_switch_at: state.last_switch_at,
            cooldown_remaining_secs: cooldown_remaining(&state, config),
        }
    }

    /// Forget a thread's switching state.
    pub fn reset_thread(&self, thread_id: &str) -> bool {
        self.threads.remove(thread_id).is_some()
    }

    /// Ids of every thread with switching state.
    pub fn thread_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.threads.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    fn switch_count(&self, thread_id: Option<&str>) -> u32 {
        thread_id
            .and_then(|id| self.threads.get(id).map(|s| s.switch_count))
            .unwrap_or(0)
    }

    /// Only threads that already have switching state are touched; a
    /// committed switch is what creates the entry.
    fn set_phase(&self, thread_id: Option<&str>, phase: SwitchPhase) {
        if let Some(mut state) = thread_id.and_then(|id| self.threads.get_mut(id)) {
            state.phase = phase;
        }
    }
}

fn cooldown_remaining(state: &ThreadSwitchState, config: &SwitchingConfig) -> u64 {
    let Some(last) = state.last_switch_at else {
        return 0;
    };
    let elapsed = (Utc::now() - last).num_seconds().max(0) as u64;
    config.min_switch_interval_secs.saturating_sub(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::catalog::{CASUAL_COMPANION, TECHNICAL_EXPERT};
    use crate::interfaces::{builtin_personas, InMemoryPersonaStore, InjectionResult, TemplatePromptInjector};
    use crate::utilities::errors::{DependencyError, LookupError};
    use async_trait::async_trait;

    fn orchestrator() -> SwitchingOrchestrator {
        let store: Arc<dyn PersonaStore> =
            Arc::new(InMemoryPersonaStore::with_personas(builtin_personas()));
        let injector = Arc::new(TemplatePromptInjector::new(Arc::clone(&store)));
        SwitchingOrchestrator::new(ContextAnalyzer::new(), store, injector)
    }

    fn technical_messages() -> Vec<Message> {
        vec![
            Message::user(
                "Can you give me a detailed technical explanation of the algorithm implementation \
                 and the system architecture behind distributed consensus?",
            ),
            Message::user(
                "I want to understand how the algorithm handles leader election, what implementation \
                 tradeoffs exist, and why this architecture scales under heavy load.",
            ),
        ]
    }

    fn casual_messages() -> Vec<Message> {
        vec![Message::user("Hi there! How are you?"), Message::user("Great, tell me a joke")]
    }

    struct FailingInjector;

    #[async_trait]
    impl PromptInjector for FailingInjector {
        async fn inject(&self, _request: InjectionRequest) -> Result<InjectionResult, DependencyError> {
            Err(DependencyError::Injection {
                message: "renderer offline".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_technical_context_recommends_technical_expert() {
        let o = orchestrator();
        let d = o
            .decide(&technical_messages(), CASUAL_COMPANION, None, Some("t1"), None)
            .await
            .unwrap();

        assert!(d.should_switch);
        let rec = d.recommended.as_ref().unwrap();
        assert_eq!(rec.persona.id, TECHNICAL_EXPERT);
        assert!(rec.improvement >= 0.15);
        assert_eq!(d.strategy.intensity, SwitchIntensity::Immediate);
        assert_eq!(d.strategy.approach, SwitchApproach::Seamless);
        assert!(!d.was_gated());
        // decide alone does not count as a switch
        assert_eq!(o.thread_status("t1", None).switch_count, 0);
        assert_eq!(o.thread_status("t1", None).phase, SwitchPhase::Stable);
    }

    #[tokio::test]
    async fn test_never_recommends_current_persona() {
        let o = orchestrator();
        let d = o
            .decide(&technical_messages(), TECHNICAL_EXPERT, None, Some("t1"), None)
            .await
            .unwrap();
        assert!(!d.should_switch);
        assert!(d
            .recommended
            .as_ref()
            .map(|r| r.persona.id != TECHNICAL_EXPERT)
            .unwrap_or(true));
    }

    #[tokio::test]
    async fn test_switch_limit_gates_further_decisions() {
        let o = orchestrator();
        let config = SwitchingConfig {
            max_switches_per_conversation: 1,
            min_switch_interval_secs: 0,
            ..Default::default()
        };

        let first = o
            .adapt(&technical_messages(), CASUAL_COMPANION, None, Some("t1"), Some(&config), "")
            .await
            .unwrap();
        assert!(first.adapted);
        assert_eq!(first.adaptation_type, AdaptationType::PersonalitySwitch);
        assert_eq!(first.active_persona_id(), TECHNICAL_EXPERT);

        let second = o
            .decide(&casual_messages(), TECHNICAL_EXPERT, None, Some("t1"), Some(&config))
            .await
            .unwrap();
        assert!(!second.should_switch);
        assert!(second
            .reasoning
            .gate
            .as_deref()
            .unwrap()
            .contains("Maximum switches per conversation reached"));
        assert!(second.metadata.analysis.is_none());
    }

    #[tokio::test]
    async fn test_cooldown_blocks_second_switch() {
        let o = orchestrator();
        let config = SwitchingConfig {
            max_switches_per_conversation: 10,
            ..Default::default()
        };
        let first = o
            .adapt(&technical_messages(), CASUAL_COMPANION, None, Some("t1"), Some(&config), "")
            .await
            .unwrap();
        assert!(first.adapted);

        let second = o
            .decide(&technical_messages(), CASUAL_COMPANION, None, Some("t1"), Some(&config))
            .await
            .unwrap();
        assert!(!second.should_switch);
        assert!(second.reasoning.summary.starts_with("Cooldown active"));
        assert!(o.thread_status("t1", Some(&config)).cooldown_remaining_secs > 0);
    }

    #[tokio::test]
    async fn test_unknown_persona_yields_none_adaptation() {
        let o = orchestrator();
        let result = o
            .adapt(&technical_messages(), "ghost", None, Some("t1"), None, "")
            .await
            .unwrap();
        assert!(!result.adapted);
        assert_eq!(result.adaptation_type, AdaptationType::None);
        assert!(result.metadata.error.is_some());
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_injection_failure_leaves_state_untouched() {
        let store: Arc<dyn PersonaStore> =
            Arc::new(InMemoryPersonaStore::with_personas(builtin_personas()));
        let o = SwitchingOrchestrator::new(ContextAnalyzer::new(), store, Arc::new(FailingInjector));

        let err = o
            .adapt(&technical_messages(), CASUAL_COMPANION, None, Some("t1"), None, "")
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchError::Dependency(_)));
        let status = o.thread_status("t1", None);
        assert_eq!(status.switch_count, 0);
        assert_eq!(status.phase, SwitchPhase::Stable);
        assert!(o.thread_ids().is_empty());
    }

    #[tokio::test]
    async fn test_decide_alone_creates_no_thread_state() {
        let o = orchestrator();
        o.decide(&technical_messages(), CASUAL_COMPANION, None, Some("t1"), None)
            .await
            .unwrap();
        o.decide(&casual_messages(), CASUAL_COMPANION, None, Some("t2"), None)
            .await
            .unwrap();
        assert!(o.thread_state("t1").is_none());
        assert!(o.thread_ids().is_empty());

        o.adapt(&technical_messages(), CASUAL_COMPANION, None, Some("t1"), None, "")
            .await
            .unwrap();
        assert_eq!(o.thread_ids(), vec!["t1".to_string()]);
        assert_eq!(o.thread_status("t1", None).phase, SwitchPhase::Stable);
    }

    /// Answers `forgets` once, then reports it missing.
    struct ForgetfulStore {
        inner: InMemoryPersonaStore,
        forgets: &'static str,
        lookups: parking_lot::Mutex<usize>,
    }

    #[async_trait]
    impl PersonaStore for ForgetfulStore {
        async fn find_one(&self, id: &str) -> Result<PersonaDefinition, LookupError> {
            if id == self.forgets {
                let mut lookups = self.lookups.lock();
                *lookups += 1;
                if *lookups > 1 {
                    return Err(LookupError::not_found(id));
                }
            }
            self.inner.find_one(id).await
        }

        async fn find_all(&self) -> Result<Vec<PersonaDefinition>, LookupError> {
            self.inner.find_all().await
        }
    }

    #[tokio::test]
    async fn test_adapt_resolves_current_persona_once() {
        let store = Arc::new(ForgetfulStore {
            inner: InMemoryPersonaStore::with_personas(builtin_personas()),
            forgets: CASUAL_COMPANION,
            lookups: parking_lot::Mutex::new(0),
        });
        let injector = Arc::new(TemplatePromptInjector::new(store.clone()));
        let o = SwitchingOrchestrator::new(ContextAnalyzer::new(), store.clone(), injector);

        let result = o
            .adapt(&technical_messages(), CASUAL_COMPANION, None, Some("t1"), None, "")
            .await
            .unwrap();
        assert!(result.adapted, "{:?}", result.rationale);
        assert!(result.metadata.error.is_none());
        assert_eq!(result.previous_state.persona_id, CASUAL_COMPANION);
        assert_eq!(result.new_state.persona_id, TECHNICAL_EXPERT);
        assert_eq!(*store.lookups.lock(), 1);
    }

    #[tokio::test]
    async fn test_notification_when_configured() {
        let o = orchestrator();
        let config = SwitchingConfig {
            notify_user: true,
            ..Default::default()
        };
        let result = o
            .adapt(&technical_messages(), CASUAL_COMPANION, None, Some("t1"), Some(&config), "Answer.")
            .await
            .unwrap();
        let note = result.user_notification.unwrap();
        assert!(note.contains("Technical Expert"));
        assert!(result.enhanced_prompt.unwrap().ends_with("Answer."));
        assert_eq!(
            result.decision.unwrap().strategy.approach,
            SwitchApproach::Acknowledged
        );
    }

    #[tokio::test]
    async fn test_disabled_config_never_switches() {
        let o = orchestrator();
        let config = SwitchingConfig {
            enabled: false,
            ..Default::default()
        };
        let d = o
            .decide(&technical_messages(), CASUAL_COMPANION, None, Some("t1"), Some(&config))
            .await
            .unwrap();
        assert!(!d.should_switch);
        assert!(d.was_gated());
    }

    #[tokio::test]
    async fn test_find_opportunities_does_not_commit() {
        let o = orchestrator();
        let mut messages = casual_messages();
        messages.extend(technical_messages());
        messages.extend(technical_messages());

        let found = o
            .find_opportunities(&messages, CASUAL_COMPANION, Some("t1"))
            .await
            .unwrap();
        assert!(!found.is_empty());
        assert!(found.iter().all(|op| op.suggested_persona_id.as_deref() != Some(CASUAL_COMPANION)));
        assert!(o.thread_state("t1").is_none());
    }

    #[tokio::test]
    async fn test_reset_thread_clears_limit() {
        let o = orchestrator();
        let config = SwitchingConfig {
            max_switches_per_conversation: 1,
            ..Default::default()
        };
        o.adapt(&technical_messages(), CASUAL_COMPANION, None, Some("t1"), Some(&config), "")
            .await
            .unwrap();
        assert!(o.reset_thread("t1"));
        assert!(!o.reset_thread("t1"));
        let d = o
            .decide(&technical_messages(), CASUAL_COMPANION, None, Some("t1"), Some(&config))
            .await
            .unwrap();
        assert!(d.should_switch);
    }
}
