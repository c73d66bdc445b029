//! Context-aware switching service: runs one conversational turn end to end.
//!
//! ```text
//!  TurnRequest
//!      │
//!      ▼
//!  [Analyze]       ContextAnalyzer
//!  [ScoreCurrent]  CompatibilityScorer ── no trigger and score ≥ floor ──▶ TurnResult (short-circuit)
//!  [Decide]        SwitchingOrchestrator::adapt ── dependency failure ──▶ TurnResult (nothing stored)
//!  [Snapshot]      on a message-count cadence (state tracking on)
//!  [Smooth]        TransitionSmoother (executed switches only)
//!  [Record]        StateTracker snapshot + change timeline
//!      │
//!      ▼
//!  TurnResult
//! ```
//!
//! Each bracketed stage runs through the [`HookRegistry`]. Calls for the same
//! thread id are serialized by a per-thread async mutex; different threads
//! never contend. Every collaborator failure comes back as data in the
//! [`TurnResult`]. A turn touches thread state only after the decide stage
//! succeeds; the cadence snapshot also runs on the short-circuit path.

pub mod analytics;
pub mod config;
pub mod monitoring;
pub mod recommend;
pub mod types;

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::analysis::{ContextAnalysisResult, ContextAnalyzer};
use crate::hooks::{HookRegistry, PipelineHook, PipelineStage};
use crate::interfaces::{PersonaStore, PromptInjector, ThreadStore};
use crate::scoring::CompatibilityScorer;
use crate::state::{ChangeType, SnapshotReason, StateTracker};
use crate::switching::{AdaptationResult, AdaptationType, PersonaState, SwitchingDecision, SwitchingOrchestrator};
use crate::transition::{ConversationStats, SmoothTransition, TransitionSmoother};
use crate::types::{ConversationContext, Message};
use crate::utilities::errors::{ConfigError, LookupError, SwitchError};

pub use config::{ServiceConfig, ThreadConfiguration, TransitionOverrides};
pub use types::*;

/// Messages handed to the smoother as recent context.
const RECENT_MESSAGES: usize = 5;

/// What the service remembers about a thread between turns.
#[derive(Debug, Clone, Default)]
struct ThreadRuntime {
    active_persona_id: String,
    messages: Vec<Message>,
    /// History length at the last snapshot.
    last_snapshot_len: Option<usize>,
    turns: u64,
}

/// Root coordinator of the switching engine.
pub struct ContextAwareSwitchingService {
    analyzer: ContextAnalyzer,
    scorer: CompatibilityScorer,
    orchestrator: SwitchingOrchestrator,
    smoother: TransitionSmoother,
    state: StateTracker,
    thread_store: Option<Arc<dyn ThreadStore>>,
    hooks: HookRegistry,
    config: ServiceConfig,
    configurations: DashMap<String, ThreadConfiguration>,
    runtimes: DashMap<String, ThreadRuntime>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    monitors: DashMap<String, JoinHandle<()>>,
    reports: DashMap<String, MonitoringReport>,
}

impl ContextAwareSwitchingService {
    pub fn new(store: Arc<dyn PersonaStore>, injector: Arc<dyn PromptInjector>) -> Self {
        Self::with_config(ContextAnalyzer::new(), store, injector, ServiceConfig::default())
    }

    pub fn with_config(
        analyzer: ContextAnalyzer,
        store: Arc<dyn PersonaStore>,
        injector: Arc<dyn PromptInjector>,
        config: ServiceConfig,
    ) -> Self {
        let orchestrator = SwitchingOrchestrator::new(analyzer.clone(), Arc::clone(&store), injector)
            .with_default_config(config.thread_defaults.switching.clone());
        Self {
            scorer: CompatibilityScorer::new(Arc::clone(&store)),
            smoother: TransitionSmoother::new(Arc::clone(&store)),
            state: StateTracker::with_config(analyzer.clone(), store, config.state.clone()),
            orchestrator,
            analyzer,
            thread_store: None,
            hooks: HookRegistry::new(),
            config,
            configurations: DashMap::new(),
            runtimes: DashMap::new(),
            locks: DashMap::new(),
            monitors: DashMap::new(),
            reports: DashMap::new(),
        }
    }

    /// Builder: enrich recommendations from a thread store.
    pub fn with_thread_store(mut self, thread_store: Arc<dyn ThreadStore>) -> Self {
        self.thread_store = Some(thread_store);
        self
    }

    /// Builder: observe pipeline stages.
    pub fn with_hook(mut self, hook: impl PipelineHook) -> Self {
        self.hooks.register(hook);
        self
    }

    pub fn orchestrator(&self) -> &SwitchingOrchestrator {
        &self.orchestrator
    }

    pub fn state(&self) -> &StateTracker {
        &self.state
    }

    pub fn smoother(&self) -> &TransitionSmoother {
        &self.smoother
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Effective configuration of a thread.
    pub fn configuration(&self, thread_id: &str) -> ThreadConfiguration {
        self.configurations
            .get(thread_id)
            .map(|c| c.value().clone())
            .unwrap_or_else(|| self.config.thread_defaults.clone())
    }

    /// Deep-merge `overrides` into the thread's configuration.
    pub fn set_configuration(
        &self,
        thread_id: &str,
        overrides: &Value,
    ) -> Result<ThreadConfiguration, ConfigError> {
        let merged = self.configuration(thread_id).merged(overrides)?;
        self.configurations.insert(thread_id.to_string(), merged.clone());
        log::info!("Updated configuration for thread {}", thread_id);
        Ok(merged)
    }

    // -----------------------------------------------------------------------
    // Turn pipeline
    // -----------------------------------------------------------------------

    /// Run one turn. Only malformed requests are errors; every collaborator
    /// failure is reported inside the [`TurnResult`].
    pub async fn process_turn(&self, request: TurnRequest) -> Result<TurnResult, SwitchError> {
        if request.thread_id.trim().is_empty() {
            return Err(SwitchError::InvalidArgument("thread_id must not be empty".to_string()));
        }
        if request.current_persona_id.trim().is_empty() {
            return Err(SwitchError::InvalidArgument(
                "current_persona_id must not be empty".to_string(),
            ));
        }

        let lock = self.thread_lock(&request.thread_id);
        let _guard = lock.lock().await;

        let thread_id = request.thread_id.as_str();
        let current_id = request.current_persona_id.as_str();
        let messages = request.messages.as_slice();
        let context = request.context.as_ref();
        let config = self.configuration(thread_id);

        // 1. analyze
        let analysis = self
            .hooks
            .run(
                PipelineStage::Analyze,
                thread_id,
                self.analyzer.analyze(messages, context, Some(current_id)),
            )
            .await;

        // 2. score the active persona
        let current_score = match self
            .hooks
            .run_result(
                PipelineStage::ScoreCurrent,
                thread_id,
                self.scorer.score(current_id, &analysis),
            )
            .await
        {
            Ok(score) => score,
            Err(e) => {
                log::warn!("Thread {}: cannot score current persona: {}", thread_id, e);
                let snapshot_id = self.commit_turn(&request, &config).await;
                return Ok(lookup_failure(&request, e, analysis, snapshot_id));
            }
        };

        // 3. short-circuit
        let triggers_fired = !analysis.switching_triggers.reasons.is_empty();
        if !triggers_fired && current_score.overall >= config.min_compatibility_score {
            log::debug!(
                "Thread {}: no triggers, {} scores {:.2}; keeping persona",
                thread_id,
                current_id,
                current_score.overall
            );
            let snapshot_id = self.commit_turn(&request, &config).await;
            return Ok(TurnResult {
                thread_id: thread_id.to_string(),
                status: TurnStatus::Unchanged,
                previous_persona_id: current_id.to_string(),
                active_persona_id: current_id.to_string(),
                adaptation_type: AdaptationType::None,
                current_score: Some(current_score.overall),
                new_score: None,
                confidence: current_score.confidence,
                rationale: vec![format!(
                    "No switching triggers fired and the active persona fits ({:.2} ≥ {:.2})",
                    current_score.overall, config.min_compatibility_score
                )],
                prompt: request.original_prompt.clone(),
                transition: None,
                user_notification: None,
                snapshot_id,
                short_circuited: true,
                analysis: Some(analysis),
                adaptation: None,
                error: None,
                processed_at: chrono::Utc::now(),
            });
        }

        // 4. decide and adapt
        let adaptation = match self
            .hooks
            .run_result(
                PipelineStage::Decide,
                thread_id,
                self.orchestrator.adapt_with_analysis(
                    analysis.clone(),
                    messages,
                    current_id,
                    Some(thread_id),
                    Some(&config.switching),
                    &request.original_prompt,
                ),
            )
            .await
        {
            Ok(adaptation) => adaptation,
            Err(e) => {
                log::warn!("Thread {}: adaptation failed: {}", thread_id, e);
                let status = if e.is_lookup() { TurnStatus::Unchanged } else { TurnStatus::Failed };
                let mut result = TurnResult::failed(&request, status, e.to_string());
                result.current_score = Some(current_score.overall);
                result.analysis = Some(analysis);
                return Ok(result);
            }
        };

        // commit: remember the turn, take a due cadence snapshot
        let mut snapshot_id = self.commit_turn(&request, &config).await;

        // 5. smooth an executed switch
        let new_id = adaptation.active_persona_id().to_string();
        let mut prompt = adaptation
            .enhanced_prompt
            .clone()
            .unwrap_or_else(|| request.original_prompt.clone());
        let mut user_notification = adaptation.user_notification.clone();
        let mut transition = None;
        let mut new_score = None;

        if adaptation.adaptation_type.changes_persona() {
            if config.enable_transition_smoothing {
                match self
                    .hooks
                    .run_result(
                        PipelineStage::Smooth,
                        thread_id,
                        self.smooth_switch(thread_id, current_id, &new_id, &prompt, messages, &analysis, &config),
                    )
                    .await
                {
                    Ok(smooth) => {
                        prompt = smooth.smoothed_prompt.clone();
                        if smooth.user_message.is_some() {
                            user_notification = smooth.user_message.clone();
                        }
                        transition = Some(AppliedTransition {
                            smoothed_prompt: smooth.smoothed_prompt,
                            bridging_elements: smooth.bridging_elements,
                            metadata: smooth.metadata,
                        });
                    }
                    Err(e) => log::warn!(
                        "Thread {}: smoothing failed, using injected prompt: {}",
                        thread_id,
                        e
                    ),
                }
            }
            new_score = match self.scorer.score(&new_id, &analysis).await {
                Ok(score) => Some(score.overall),
                Err(e) => {
                    log::warn!("Thread {}: cannot re-score {}: {}", thread_id, new_id, e);
                    None
                }
            };
        }

        // 6. record
        if config.enable_state_tracking && adaptation.adapted {
            let recorded = self
                .hooks
                .run(
                    PipelineStage::Record,
                    thread_id,
                    self.record(&request, &adaptation, &analysis, current_score.overall, new_score),
                )
                .await;
            if recorded.is_some() {
                snapshot_id = recorded;
            }
        }

        if adaptation.adaptation_type.changes_persona() {
            if let Some(mut runtime) = self.runtimes.get_mut(thread_id) {
                runtime.active_persona_id = new_id.clone();
            }
            log::info!("Thread {}: switched {} -> {}", thread_id, current_id, new_id);
        }

        let status = match adaptation.adaptation_type {
            AdaptationType::PersonalitySwitch | AdaptationType::Hybrid => TurnStatus::Switched,
            AdaptationType::TraitAdjustment => TurnStatus::Adjusted,
            AdaptationType::None => TurnStatus::Unchanged,
        };

        Ok(TurnResult {
            thread_id: thread_id.to_string(),
            status,
            previous_persona_id: current_id.to_string(),
            active_persona_id: new_id,
            adaptation_type: adaptation.adaptation_type,
            current_score: Some(current_score.overall),
            new_score,
            confidence: adaptation.confidence,
            rationale: adaptation.rationale.clone(),
            prompt,
            transition,
            user_notification,
            snapshot_id,
            short_circuited: false,
            analysis: Some(analysis),
            error: adaptation.metadata.error.clone(),
            adaptation: Some(adaptation),
            processed_at: chrono::Utc::now(),
        })
    }

    /// Switching decision for a thread under its configuration. Commits nothing.
    pub async fn decide(
        &self,
        thread_id: &str,
        messages: &[Message],
        current_persona_id: &str,
        context: Option<&ConversationContext>,
    ) -> Result<SwitchingDecision, SwitchError> {
        let config = self.configuration(thread_id);
        self.orchestrator
            .decide(messages, current_persona_id, context, Some(thread_id), Some(&config.switching))
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn smooth_switch(
        &self,
        thread_id: &str,
        from_id: &str,
        to_id: &str,
        prompt: &str,
        messages: &[Message],
        analysis: &ContextAnalysisResult,
        config: &ThreadConfiguration,
    ) -> Result<SmoothTransition, LookupError> {
        let switch_count = self
            .orchestrator
            .thread_status(thread_id, Some(&config.switching))
            .switch_count;
        let mut stats = ConversationStats::from_messages(messages, switch_count);
        stats.recent_sentiment = Some(analysis.emotional_context.sentiment);

        let tuned = self.smoother.optimize_transition_config(from_id, to_id, &stats).await?;
        let transition_config = config.transition.apply(tuned);
        let recent = &messages[messages.len().saturating_sub(RECENT_MESSAGES)..];
        self.smoother
            .create_smooth_transition(from_id, to_id, prompt, recent, &transition_config)
            .await
    }

    /// Record an adaptation in the state tracker. Returns the id of a
    /// snapshot taken for it.
    async fn record(
        &self,
        request: &TurnRequest,
        adaptation: &AdaptationResult,
        analysis: &ContextAnalysisResult,
        current_score: f64,
        new_score: Option<f64>,
    ) -> Option<String> {
        let thread_id = request.thread_id.as_str();
        let from_id = request.current_persona_id.as_str();
        let to_id = adaptation.active_persona_id();
        let trigger = analysis.intent.as_str();

        match adaptation.adaptation_type {
            AdaptationType::PersonalitySwitch | AdaptationType::Hybrid => {
                self.state.clear_adjustments(thread_id);
                if adaptation.adaptation_type == AdaptationType::Hybrid {
                    self.state.record_adjustments(thread_id, &adaptation.trait_deltas);
                }
                let snapshot = self
                    .state
                    .snapshot(
                        thread_id,
                        to_id,
                        &request.messages,
                        request.context.as_ref(),
                        SnapshotReason::PersonaSwitch,
                    )
                    .await;
                self.mark_snapshot(thread_id, request.messages.len());
                self.state.track_change(
                    thread_id,
                    ChangeType::PersonaSwitch,
                    &format!("{} from {} to {}", adaptation.adaptation_type.as_str(), from_id, to_id),
                    Some(from_id),
                    Some(to_id),
                    trigger,
                    new_score.map(|score| score - current_score),
                );
                Some(snapshot.id)
            }
            AdaptationType::TraitAdjustment => {
                self.state.record_adjustments(thread_id, &adaptation.trait_deltas);
                self.state.track_change(
                    thread_id,
                    ChangeType::TraitAdjustment,
                    &format!("Adjusted {} trait(s) of {}", adaptation.trait_deltas.len(), from_id),
                    Some(from_id),
                    Some(from_id),
                    trigger,
                    None,
                );
                None
            }
            AdaptationType::None => None,
        }
    }

    // -----------------------------------------------------------------------
    // Thread bookkeeping
    // -----------------------------------------------------------------------

    fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Persist the turn: remember the request and take the cadence snapshot
    /// if one is due. Runs only once the turn can no longer fail.
    async fn commit_turn(&self, request: &TurnRequest, config: &ThreadConfiguration) -> Option<String> {
        let thread_id = request.thread_id.as_str();
        let messages = request.messages.as_slice();
        self.remember(request);
        if !config.enable_state_tracking {
            return None;
        }
        let reason = self.snapshot_due(thread_id, messages.len(), config.snapshot_interval)?;
        let snapshot = self
            .hooks
            .run(
                PipelineStage::Snapshot,
                thread_id,
                self.state.snapshot(
                    thread_id,
                    &request.current_persona_id,
                    messages,
                    request.context.as_ref(),
                    reason,
                ),
            )
            .await;
        self.mark_snapshot(thread_id, messages.len());
        Some(snapshot.id)
    }

    fn remember(&self, request: &TurnRequest) {
        let mut runtime = self.runtimes.entry(request.thread_id.clone()).or_default();
        runtime.active_persona_id = request.current_persona_id.clone();
        runtime.messages = request.messages.clone();
        runtime.turns += 1;
    }

    fn snapshot_due(&self, thread_id: &str, message_count: usize, interval: usize) -> Option<SnapshotReason> {
        let last = self.runtimes.get(thread_id).and_then(|r| r.last_snapshot_len);
        match last {
            None => Some(SnapshotReason::ConversationStart),
            Some(len) if message_count >= len + interval.max(1) => Some(SnapshotReason::Periodic),
            Some(_) => None,
        }
    }

    fn mark_snapshot(&self, thread_id: &str, message_count: usize) {
        if let Some(mut runtime) = self.runtimes.get_mut(thread_id) {
            runtime.last_snapshot_len = Some(message_count);
        }
    }

    /// Persona the service last saw active on a thread.
    pub fn active_persona(&self, thread_id: &str) -> Option<String> {
        self.runtimes.get(thread_id).map(|r| r.active_persona_id.clone())
    }

    /// Turns processed for a thread.
    pub fn turn_count(&self, thread_id: &str) -> u64 {
        self.runtimes.get(thread_id).map(|r| r.turns).unwrap_or(0)
    }

    /// Threads the service holds any state for.
    pub fn thread_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .runtimes
            .iter()
            .map(|e| e.key().clone())
            .chain(self.state.thread_ids())
            .chain(self.orchestrator.thread_ids())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Release every structure held for a thread. Call when a conversation
    /// ends. Returns whether anything was held.
    pub fn cleanup(&self, thread_id: &str) -> bool {
        let monitored = self.stop_monitoring(thread_id);
        let switching = self.orchestrator.reset_thread(thread_id);
        let tracked = self.state.cleanup(thread_id);
        let configured = self.configurations.remove(thread_id).is_some();
        let seen = self.runtimes.remove(thread_id).is_some();
        self.reports.remove(thread_id);
        // a turn in flight still holds the lock; keep it so later turns queue on it
        self.locks
            .remove_if(thread_id, |_, lock| Arc::strong_count(lock) == 1);
        log::info!("Cleaned up thread {}", thread_id);
        monitored || switching || tracked || configured || seen
    }
}

fn lookup_failure(
    request: &TurnRequest,
    error: LookupError,
    analysis: ContextAnalysisResult,
    snapshot_id: Option<String>,
) -> TurnResult {
    let message = error.to_string();
    let mut result = TurnResult::failed(request, TurnStatus::Unchanged, message.clone());
    result.adaptation = Some(AdaptationResult::unchanged(
        PersonaState::unresolved(&request.current_persona_id),
        Some(&request.thread_id),
        vec![message.clone()],
        None,
        Some(message),
    ));
    result.analysis = Some(analysis);
    result.snapshot_id = snapshot_id;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::catalog::{CASUAL_COMPANION, TECHNICAL_EXPERT};
    use crate::interfaces::{builtin_personas, InMemoryPersonaStore, TemplatePromptInjector};
    use crate::utilities::errors::DependencyError;
    use crate::interfaces::{InjectionRequest, InjectionResult};
    use async_trait::async_trait;
    use serde_json::json;

    pub(crate) fn service() -> ContextAwareSwitchingService {
        let store: Arc<InMemoryPersonaStore> = Arc::new(InMemoryPersonaStore::with_personas(builtin_personas()));
        let injector = Arc::new(TemplatePromptInjector::new(store.clone()));
        ContextAwareSwitchingService::new(store, injector)
    }

    pub(crate) fn technical_chat() -> Vec<Message> {
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

    struct FailingInjector;

    #[async_trait]
    impl PromptInjector for FailingInjector {
        async fn inject(&self, _request: InjectionRequest) -> Result<InjectionResult, DependencyError> {
            Err(DependencyError::Injection {
                message: "template engine offline".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_casual_turn_short_circuits() {
        let svc = service();
        let result = svc
            .process_turn(TurnRequest::new(
                "t1",
                vec![Message::user("Hi there! How are you?"), Message::user("Great, tell me a joke")],
                CASUAL_COMPANION,
            ))
            .await
            .unwrap();
        assert_eq!(result.status, TurnStatus::Unchanged);
        assert_eq!(result.active_persona_id, CASUAL_COMPANION);
        assert!(result.snapshot_id.is_some());
        assert_eq!(svc.state().snapshot_count("t1"), 1);
    }

    #[tokio::test]
    async fn test_technical_turn_switches_and_records() {
        let svc = service();
        let result = svc
            .process_turn(TurnRequest::new("t1", technical_chat(), CASUAL_COMPANION).with_prompt("Answer the user."))
            .await
            .unwrap();

        assert!(result.switched(), "{:?}", result.rationale);
        assert_eq!(result.active_persona_id, TECHNICAL_EXPERT);
        assert!(result.new_score.unwrap() > result.current_score.unwrap());
        assert!(result.transition.is_some());
        assert!(result.prompt.contains("Answer the user."));

        let snapshots = svc.state().snapshots("t1");
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[1].metadata.reason, SnapshotReason::PersonaSwitch);
        assert_eq!(snapshots[1].persona_id(), TECHNICAL_EXPERT);
        let evolution = svc.state().evolution("t1").unwrap();
        assert_eq!(evolution.trends.switch_count, 1);
        assert_eq!(svc.active_persona("t1").as_deref(), Some(TECHNICAL_EXPERT));
    }

    #[tokio::test]
    async fn test_unknown_persona_is_data() {
        let svc = service();
        let result = svc
            .process_turn(TurnRequest::new("t1", technical_chat(), "ghost"))
            .await
            .unwrap();
        assert_eq!(result.status, TurnStatus::Unchanged);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.adaptation.unwrap().adaptation_type, AdaptationType::None);
        assert!(result.error.unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn test_injection_failure_is_data_without_mutation() {
        let store = Arc::new(InMemoryPersonaStore::with_personas(builtin_personas()));
        let svc = ContextAwareSwitchingService::new(store, Arc::new(FailingInjector));
        let result = svc
            .process_turn(TurnRequest::new("t1", technical_chat(), CASUAL_COMPANION))
            .await
            .unwrap();
        assert_eq!(result.status, TurnStatus::Failed);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.active_persona_id, CASUAL_COMPANION);
        assert!(result.snapshot_id.is_none());
        assert_eq!(svc.orchestrator().thread_status("t1", None).switch_count, 0);
        assert!(svc.state().evolution("t1").is_none());
        assert_eq!(svc.state().snapshot_count("t1"), 0);
        assert!(svc.orchestrator().thread_ids().is_empty());
        assert_eq!(svc.turn_count("t1"), 0);
        assert!(svc.thread_ids().is_empty());
    }

    #[tokio::test]
    async fn test_empty_thread_id_fails_fast() {
        let svc = service();
        let err = svc
            .process_turn(TurnRequest::new("", technical_chat(), CASUAL_COMPANION))
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_configuration_limits_switches() {
        let svc = service();
        svc.set_configuration("t1", &json!({"switching": {"max_switches_per_conversation": 0}}))
            .unwrap();
        let result = svc
            .process_turn(TurnRequest::new("t1", technical_chat(), CASUAL_COMPANION))
            .await
            .unwrap();
        assert!(!result.switched());
        assert!(result.rationale.iter().any(|r| r.contains("Maximum switches")));
        assert!(svc.set_configuration("t1", &json!({"bogus": 1})).is_err());
    }

    #[tokio::test]
    async fn test_snapshot_cadence() {
        let svc = service();
        svc.set_configuration("t1", &json!({"snapshot_interval": 2})).unwrap();
        let mut messages = vec![Message::user("Hi there! How are you?")];
        for i in 0..4 {
            svc.process_turn(TurnRequest::new("t1", messages.clone(), CASUAL_COMPANION))
                .await
                .unwrap();
            messages.push(Message::user(format!("Haha, that is great {}", i)));
        }
        // lengths 1, 2, 3, 4 → snapshots at 1 and 3
        assert_eq!(svc.state().snapshot_count("t1"), 2);
        assert_eq!(svc.turn_count("t1"), 4);
    }

    #[tokio::test]
    async fn test_cleanup_releases_everything() {
        let svc = service();
        svc.process_turn(TurnRequest::new("t1", technical_chat(), CASUAL_COMPANION))
            .await
            .unwrap();
        assert!(svc.thread_ids().contains(&"t1".to_string()));
        assert!(svc.cleanup("t1"));
        assert!(svc.thread_ids().is_empty());
        assert!(!svc.cleanup("t1"));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_lock_of_turn_in_flight() {
        let svc = service();
        let lock = svc.thread_lock("t1");
        let guard = lock.lock().await;
        svc.cleanup("t1");
        assert!(Arc::ptr_eq(&lock, &svc.thread_lock("t1")));

        drop(guard);
        drop(lock);
        svc.cleanup("t1");
        assert!(!svc.locks.contains_key("t1"));
    }
}
