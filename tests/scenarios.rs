//! End-to-end scenarios against the public API with in-memory collaborators.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

use persona_switch::analysis::{ComplexityLevel, ConversationIntent};
use persona_switch::hooks::{HookError, StageOutcome};
use persona_switch::interfaces::catalog::{CASUAL_COMPANION, TECHNICAL_EXPERT};
use persona_switch::service::TurnStatus;
use persona_switch::state::{DataQuality, SnapshotReason, StateTrackerConfig};
use persona_switch::switching::{SwitchApproach, SwitchingConfig};
use persona_switch::{
    builtin_personas, ContextAnalyzer, ContextAwareSwitchingService, InMemoryPersonaStore, Message,
    PersonaStore, PipelineHook, PipelineStage, StateTracker, SwitchingOrchestrator, TemplatePromptInjector,
    TransitionConfig, TransitionSmoother, TurnRequest,
};

fn store() -> Arc<InMemoryPersonaStore> {
    Arc::new(InMemoryPersonaStore::with_personas(builtin_personas()))
}

fn service() -> ContextAwareSwitchingService {
    let store = store();
    let injector = Arc::new(TemplatePromptInjector::new(store.clone()));
    ContextAwareSwitchingService::new(store, injector)
}

fn orchestrator() -> SwitchingOrchestrator {
    let store = store();
    let injector = Arc::new(TemplatePromptInjector::new(store.clone()));
    SwitchingOrchestrator::new(ContextAnalyzer::new(), store, injector)
}

fn casual_chat() -> Vec<Message> {
    vec![Message::user("Hi there! How are you?"), Message::user("Great, tell me a joke")]
}

fn technical_chat() -> Vec<Message> {
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

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_scenario_casual_greeting_keeps_persona() {
    let analysis = ContextAnalyzer::new()
        .analyze(&casual_chat(), None, Some(CASUAL_COMPANION))
        .await;
    assert!(matches!(
        analysis.intent,
        ConversationIntent::InformationSeeking | ConversationIntent::CasualConversation
    ));
    assert!(!analysis.switching_triggers.should_switch);
}

#[tokio::test]
async fn test_scenario_technical_request_triggers_switch() {
    let analysis = ContextAnalyzer::new()
        .analyze(&technical_chat(), None, Some(CASUAL_COMPANION))
        .await;
    assert!(matches!(analysis.complexity.level, ComplexityLevel::High | ComplexityLevel::Expert));
    assert!(analysis.switching_triggers.should_switch);
    assert!(analysis.switching_triggers.confidence > 0.4);
}

#[tokio::test]
async fn test_scenario_switch_limit_holds_regardless_of_context() {
    let o = orchestrator();
    let config = SwitchingConfig {
        max_switches_per_conversation: 1,
        min_switch_interval_secs: 0,
        ..Default::default()
    };
    let first = o
        .adapt(&technical_chat(), CASUAL_COMPANION, None, Some("t1"), Some(&config), "")
        .await
        .unwrap();
    assert!(first.adapted);

    for (messages, current) in [
        (casual_chat(), TECHNICAL_EXPERT),
        (technical_chat(), CASUAL_COMPANION),
        (technical_chat(), TECHNICAL_EXPERT),
    ] {
        let d = o
            .decide(&messages, current, None, Some("t1"), Some(&config))
            .await
            .unwrap();
        assert!(!d.should_switch);
        assert!(d
            .reasoning
            .gate
            .as_deref()
            .unwrap_or_default()
            .contains("Maximum switches per conversation reached"));
    }
}

#[test]
fn test_scenario_single_snapshot_is_consistent() {
    let tracker = StateTracker::new(ContextAnalyzer::new(), store());
    tokio_test::block_on(tracker.snapshot(
        "t1",
        CASUAL_COMPANION,
        &casual_chat(),
        None,
        SnapshotReason::ConversationStart,
    ));
    let analysis = tracker.analyze_consistency("t1", None);
    assert_eq!(analysis.overall_consistency, 1.0);
    assert_eq!(analysis.data_quality, DataQuality::Poor);
}

#[tokio::test]
async fn test_scenario_distant_personas_are_not_seamless() {
    let smoother = TransitionSmoother::new(store());
    let config = TransitionConfig {
        intensity: 0.6,
        ..Default::default()
    };
    let t = smoother
        .create_smooth_transition(CASUAL_COMPANION, TECHNICAL_EXPERT, "Explain.", &technical_chat(), &config)
        .await
        .unwrap();
    assert_ne!(t.metadata.approach, SwitchApproach::Seamless);
    assert_eq!(
        t.user_message.is_some(),
        matches!(t.metadata.approach, SwitchApproach::Acknowledged | SwitchApproach::Explicit)
    );
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cooldown_never_allows_two_switches() {
    let o = orchestrator();
    let config = SwitchingConfig {
        max_switches_per_conversation: 10,
        ..Default::default()
    };
    let first = o
        .adapt(&technical_chat(), CASUAL_COMPANION, None, Some("t1"), Some(&config), "")
        .await
        .unwrap();
    let second = o
        .decide(&technical_chat(), CASUAL_COMPANION, None, Some("t1"), Some(&config))
        .await
        .unwrap();
    assert!(first.adapted);
    assert!(!second.should_switch);
}

#[tokio::test]
async fn test_snapshot_chain_visits_each_snapshot_once() {
    let tracker = StateTracker::with_config(
        ContextAnalyzer::new(),
        store(),
        StateTrackerConfig {
            max_snapshots: 50,
            ..Default::default()
        },
    );
    for i in 0..60 {
        let persona = if i % 2 == 0 { CASUAL_COMPANION } else { TECHNICAL_EXPERT };
        tracker
            .snapshot("t1", persona, &casual_chat(), None, SnapshotReason::Periodic)
            .await;
    }

    let all = tracker.snapshots("t1");
    assert_eq!(all.len(), 50);
    let mut visited = Vec::new();
    let mut cursor = tracker.latest_snapshot("t1");
    while let Some(snapshot) = cursor {
        assert!(!visited.contains(&snapshot.id), "cycle at {}", snapshot.id);
        visited.push(snapshot.id.clone());
        cursor = snapshot
            .metadata
            .previous_snapshot_id
            .as_ref()
            .and_then(|id| all.iter().find(|s| &s.id == id).cloned());
    }
    assert_eq!(visited.len(), 50);
    assert_eq!(visited.last(), Some(&all[0].id));
}

// ---------------------------------------------------------------------------
// Service flows
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StageLog(Mutex<Vec<PipelineStage>>);

struct Recorder(Arc<StageLog>);

impl PipelineHook for Recorder {
    fn after_stage(&self, stage: PipelineStage, _thread_id: &str, _outcome: &StageOutcome) -> Result<(), HookError> {
        self.0 .0.lock().push(stage);
        Ok(())
    }
}

#[tokio::test]
async fn test_technical_thread_switches_once_and_settles() {
    let log = Arc::new(StageLog::default());
    let svc = service().with_hook(Recorder(log.clone()));

    let first = svc
        .process_turn(TurnRequest::new("t1", technical_chat(), CASUAL_COMPANION).with_prompt("Answer."))
        .await
        .unwrap();
    assert!(first.switched(), "{:?}", first.rationale);
    assert_eq!(first.active_persona_id, TECHNICAL_EXPERT);
    assert!(first.transition.is_some());
    assert!(first.prompt.ends_with("Answer."));

    let mut history = technical_chat();
    history.push(Message::assistant("Leader election starts when a follower times out."));
    history.push(Message::user("How does the implementation recover when the leader crashes?"));
    let second = svc
        .process_turn(TurnRequest::new("t1", history, &first.active_persona_id))
        .await
        .unwrap();
    assert!(!second.switched());
    assert_eq!(second.active_persona_id, TECHNICAL_EXPERT);
    assert_eq!(svc.active_persona("t1").as_deref(), Some(TECHNICAL_EXPERT));

    let casual = svc
        .process_turn(TurnRequest::new("t2", casual_chat(), CASUAL_COMPANION))
        .await
        .unwrap();
    assert_eq!(casual.status, TurnStatus::Unchanged);
    assert!(casual.short_circuited);

    let stages = log.0.lock().clone();
    assert!(stages.contains(&PipelineStage::Smooth));
    assert!(stages.contains(&PipelineStage::Record));

    let analytics = svc.analytics();
    assert_eq!(analytics.thread_count, 2);
    assert_eq!(analytics.total_switches, 1);
    assert_eq!(analytics.persona_usage.get(TECHNICAL_EXPERT), Some(&1));

    let recommendations = svc.recommend_personas("t1", &technical_chat(), None, 2).await;
    assert_eq!(recommendations.items[0].persona_id, TECHNICAL_EXPERT);

    assert!(svc.cleanup("t1"));
    assert!(svc.state().snapshots("t1").is_empty());
    assert_eq!(svc.analytics().thread_count, 1);
}

#[tokio::test]
async fn test_concurrent_turns_on_one_thread_are_serialized() {
    let svc = Arc::new(service());
    let a = {
        let svc = svc.clone();
        tokio::spawn(async move {
            svc.process_turn(TurnRequest::new("t1", technical_chat(), CASUAL_COMPANION))
                .await
        })
    };
    let b = {
        let svc = svc.clone();
        tokio::spawn(async move {
            svc.process_turn(TurnRequest::new("t1", technical_chat(), CASUAL_COMPANION))
                .await
        })
    };
    let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());

    assert_eq!([a.switched(), b.switched()].iter().filter(|s| **s).count(), 1);
    assert_eq!(svc.turn_count("t1"), 2);
    assert_eq!(svc.orchestrator().thread_status("t1", None).switch_count, 1);
    let snapshots = svc.state().snapshots("t1");
    for pair in snapshots.windows(2) {
        assert_eq!(pair[1].metadata.previous_snapshot_id.as_deref(), Some(pair[0].id.as_str()));
    }
}

#[tokio::test]
async fn test_personas_load_from_yaml_file() {
    let yaml = serde_yaml::to_string(&builtin_personas()).unwrap();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    let store = InMemoryPersonaStore::from_yaml_file(file.path()).unwrap();
    assert_eq!(store.len(), builtin_personas().len());
    let persona = store.find_one(TECHNICAL_EXPERT).await.unwrap();
    assert_eq!(persona.name, "Technical Expert");
}
