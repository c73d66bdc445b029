//! State tracker: per-thread persona history.
//!
//! Owns every thread-scoped record of what persona was active and how well
//! it fit:
//!
//! ```text
//!   snapshot() ──▶ BoundedLog<StateSnapshot>  (≤ max_snapshots, linked prev/next)
//!   track_change() ──▶ EvolutionTracking      (timeline, trends, learned mappings)
//!   analyze_consistency() ──▶ TtlCache<(thread, window), ConsistencyAnalysis>
//!   predict_optimal_persona() ── learned ▸ recently effective ▸ default
//! ```
//!
//! Nothing here returns an error: an unknown persona still gets a snapshot
//! with an unresolved summary.

pub mod consistency;
pub mod evolution;
pub mod prediction;
pub mod snapshot;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::ContextAnalyzer;
use crate::interfaces::PersonaStore;
use crate::scoring::CompatibilityScorer;
use crate::switching::TraitDelta;
use crate::types::{ConversationContext, Message};
use crate::utilities::{BoundedLog, TtlCache};

pub use consistency::{
    ConsistencyAnalysis, ConsistencyMetrics, DataQuality, Inconsistency, InconsistencyType, Severity,
};
pub use evolution::{
    ChangeType, EvolutionTracking, EvolutionTrends, LearnedMapping, PersonaChange, PredictiveIndicators,
};
pub use prediction::{PersonaAlternative, PersonaPrediction, PredictionSource};
pub use snapshot::{
    ActivePersonaSummary, ConversationMetrics, PerformanceMetrics, SnapshotMetadata, SnapshotReason,
    StateSnapshot,
};

/// Alignment recorded when the active persona cannot be resolved.
const UNRESOLVED_ALIGNMENT: f64 = 0.5;
/// Half-to-half alignment change treated as no change.
const TREND_DEAD_BAND: f64 = 0.05;
/// Topics kept per snapshot.
const SNAPSHOT_TOPICS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTrackerConfig {
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: usize,
    #[serde(default = "default_cache_ttl")]
    pub consistency_cache_ttl_secs: u64,
    /// Last resort of [`StateTracker::predict_optimal_persona`].
    #[serde(default = "default_persona_id")]
    pub default_persona_id: String,
}

fn default_max_snapshots() -> usize { 50 }
fn default_cache_ttl() -> u64 { 1800 }
fn default_persona_id() -> String { crate::interfaces::catalog::DEFAULT_ASSISTANT.to_string() }

impl Default for StateTrackerConfig {
    fn default() -> Self {
        Self {
            max_snapshots: default_max_snapshots(),
            consistency_cache_ttl_secs: default_cache_ttl(),
            default_persona_id: default_persona_id(),
        }
    }
}

/// Direction of context alignment over the retained snapshot chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceDirection {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceTrend {
    pub direction: PerformanceDirection,
    pub first_half_alignment: Option<f64>,
    pub second_half_alignment: Option<f64>,
    pub sample_size: usize,
}

type ConsistencyKey = (String, Option<usize>);

/// In-memory state tracker for all threads.
pub struct StateTracker {
    config: StateTrackerConfig,
    analyzer: ContextAnalyzer,
    scorer: CompatibilityScorer,
    store: Arc<dyn PersonaStore>,
    snapshots: DashMap<String, BoundedLog<StateSnapshot>>,
    evolution: DashMap<String, EvolutionTracking>,
    adjustments: DashMap<String, Vec<TraitDelta>>,
    consistency_cache: TtlCache<ConsistencyKey, ConsistencyAnalysis>,
}

impl StateTracker {
    pub fn new(analyzer: ContextAnalyzer, store: Arc<dyn PersonaStore>) -> Self {
        Self::with_config(analyzer, store, StateTrackerConfig::default())
    }

    pub fn with_config(
        analyzer: ContextAnalyzer,
        store: Arc<dyn PersonaStore>,
        config: StateTrackerConfig,
    ) -> Self {
        let ttl = Duration::from_secs(config.consistency_cache_ttl_secs);
        Self {
            analyzer,
            scorer: CompatibilityScorer::new(Arc::clone(&store)),
            store,
            snapshots: DashMap::new(),
            evolution: DashMap::new(),
            adjustments: DashMap::new(),
            consistency_cache: TtlCache::new(ttl),
            config,
        }
    }

    pub fn config(&self) -> &StateTrackerConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Record the thread's current persona state and link it into the chain.
    pub async fn snapshot(
        &self,
        thread_id: &str,
        persona_id: &str,
        messages: &[Message],
        context: Option<&ConversationContext>,
        reason: SnapshotReason,
    ) -> StateSnapshot {
        let analysis = self.analyzer.analyze(messages, context, Some(persona_id)).await;

        let (active_persona, alignment) = match self.store.find_one(persona_id).await {
            Ok(persona) => (
                ActivePersonaSummary::of(&persona),
                self.scorer.score_persona(&persona, &analysis).overall,
            ),
            Err(e) => {
                log::warn!("Snapshot for thread {} with unresolved persona: {}", thread_id, e);
                (ActivePersonaSummary::unresolved(persona_id), UNRESOLVED_ALIGNMENT)
            }
        };

        let trait_adjustments = self
            .adjustments
            .get(thread_id)
            .map(|a| a.value().clone())
            .unwrap_or_default();

        let mut snapshot = StateSnapshot {
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.to_string(),
            timestamp: Utc::now(),
            active_persona,
            trait_adjustments,
            conversation_metrics: ConversationMetrics {
                message_count: messages.len(),
                user_message_count: messages.iter().filter(|m| m.is_user()).count(),
                average_message_length: snapshot::average_message_length(messages),
                intent: analysis.intent,
                topics: analysis
                    .topic_names(SNAPSHOT_TOPICS)
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            },
            performance_metrics: PerformanceMetrics {
                context_alignment_score: alignment,
                user_engagement_score: snapshot::engagement_score(messages),
                response_quality_score: snapshot::response_quality_score(messages, alignment),
                consistency_score: 1.0,
            },
            metadata: SnapshotMetadata {
                reason,
                previous_snapshot_id: None,
                next_snapshot_id: None,
            },
        };

        {
            let mut chain = self
                .snapshots
                .entry(thread_id.to_string())
                .or_insert_with(|| BoundedLog::new(self.config.max_snapshots));

            snapshot.performance_metrics.consistency_score =
                snapshot::consistency_with(chain.latest(), persona_id, alignment);
            if let Some(prev) = chain.latest_mut() {
                prev.metadata.next_snapshot_id = Some(snapshot.id.clone());
                snapshot.metadata.previous_snapshot_id = Some(prev.id.clone());
            }
            if chain.push(snapshot.clone()).is_some() {
                if let Some(oldest) = chain.oldest_mut() {
                    oldest.metadata.previous_snapshot_id = None;
                }
            }
        }

        self.invalidate_consistency(thread_id);
        log::debug!(
            "Snapshot {} for thread {} ({}, alignment {:.2})",
            snapshot.id,
            thread_id,
            reason.as_str(),
            alignment
        );
        snapshot
    }

    /// Retained snapshots, oldest first.
    pub fn snapshots(&self, thread_id: &str) -> Vec<StateSnapshot> {
        self.snapshots
            .get(thread_id)
            .map(|chain| chain.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn latest_snapshot(&self, thread_id: &str) -> Option<StateSnapshot> {
        self.snapshots.get(thread_id).and_then(|chain| chain.latest().cloned())
    }

    pub fn snapshot_count(&self, thread_id: &str) -> usize {
        self.snapshots.get(thread_id).map(|chain| chain.len()).unwrap_or(0)
    }

    /// Record trait adjustments applied to the active persona.
    ///
    /// Later deltas for the same trait replace earlier ones.
    pub fn record_adjustments(&self, thread_id: &str, deltas: &[TraitDelta]) {
        let mut current = self.adjustments.entry(thread_id.to_string()).or_default();
        for delta in deltas {
            match current.iter_mut().find(|d| d.trait_name == delta.trait_name) {
                Some(existing) => *existing = delta.clone(),
                None => current.push(delta.clone()),
            }
        }
    }

    /// Forget adjustments, e.g. after the persona itself changed.
    pub fn clear_adjustments(&self, thread_id: &str) {
        self.adjustments.remove(thread_id);
    }

    // -----------------------------------------------------------------------
    // Evolution
    // -----------------------------------------------------------------------

    /// Append a change to the thread's timeline and refresh its trends.
    #[allow(clippy::too_many_arguments)]
    pub fn track_change(
        &self,
        thread_id: &str,
        change_type: ChangeType,
        description: &str,
        from_persona_id: Option<&str>,
        to_persona_id: Option<&str>,
        trigger: &str,
        impact: Option<f64>,
    ) -> PersonaChange {
        let change = PersonaChange::new(change_type, description, from_persona_id, to_persona_id, trigger, impact);
        self.evolution
            .entry(thread_id.to_string())
            .or_insert_with(|| EvolutionTracking::new(thread_id))
            .record(change.clone());
        log::debug!("Thread {} change: {} ({})", thread_id, change_type.as_str(), description);
        change
    }

    pub fn evolution(&self, thread_id: &str) -> Option<EvolutionTracking> {
        self.evolution.get(thread_id).map(|e| e.value().clone())
    }

    // -----------------------------------------------------------------------
    // Consistency
    // -----------------------------------------------------------------------

    /// Analyze the last `window` snapshots (all when `None`). Cached per
    /// `(thread, window)` until the TTL lapses or a new snapshot arrives.
    pub fn analyze_consistency(&self, thread_id: &str, window: Option<usize>) -> ConsistencyAnalysis {
        let key = (thread_id.to_string(), window);
        if let Some(cached) = self.consistency_cache.get(&key) {
            return cached;
        }

        let analysis = match self.snapshots.get(thread_id) {
            Some(chain) => {
                let selected: Vec<&StateSnapshot> = match window {
                    Some(n) => chain.tail(n),
                    None => chain.iter().collect(),
                };
                consistency::analyze(thread_id, window, &selected)
            }
            None => consistency::analyze(thread_id, window, &[]),
        };

        if analysis.has_issues() {
            log::info!(
                "Thread {} has {} consistency issue(s)",
                thread_id,
                analysis.inconsistencies.len()
            );
        }
        self.consistency_cache.insert(key, analysis.clone());
        analysis
    }

    fn invalidate_consistency(&self, thread_id: &str) {
        self.consistency_cache.invalidate_where(|(t, _)| t == thread_id);
    }

    // -----------------------------------------------------------------------
    // Prediction & trends
    // -----------------------------------------------------------------------

    /// Predict the persona best suited to the conversation's current intent.
    pub async fn predict_optimal_persona(
        &self,
        thread_id: &str,
        messages: &[Message],
        context: Option<&ConversationContext>,
    ) -> PersonaPrediction {
        let analysis = self.analyzer.analyze(messages, context, None).await;
        let trigger = analysis.intent.as_str();

        let evolution = self.evolution(thread_id);
        let snapshots = self.snapshots(thread_id);
        let refs: Vec<&StateSnapshot> = snapshots.iter().collect();

        let prediction = prediction::predict(
            thread_id,
            trigger,
            evolution.as_ref(),
            &refs,
            &self.config.default_persona_id,
        );
        log::debug!(
            "Predicted {} for thread {} from {:?}",
            prediction.persona_id,
            thread_id,
            prediction.source
        );
        prediction
    }

    /// Compare average alignment of the older and newer halves of the chain.
    pub fn performance_trend(&self, thread_id: &str) -> PerformanceTrend {
        let alignments: Vec<f64> = self
            .snapshots
            .get(thread_id)
            .map(|chain| chain.iter().map(|s| s.alignment()).collect())
            .unwrap_or_default();

        if alignments.len() < 2 {
            return PerformanceTrend {
                direction: PerformanceDirection::InsufficientData,
                first_half_alignment: None,
                second_half_alignment: None,
                sample_size: alignments.len(),
            };
        }

        let mid = alignments.len() / 2;
        let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
        let first = mean(&alignments[..mid]);
        let second = mean(&alignments[mid..]);
        let direction = if second - first > TREND_DEAD_BAND {
            PerformanceDirection::Improving
        } else if first - second > TREND_DEAD_BAND {
            PerformanceDirection::Declining
        } else {
            PerformanceDirection::Stable
        };

        PerformanceTrend {
            direction,
            first_half_alignment: Some(first),
            second_half_alignment: Some(second),
            sample_size: alignments.len(),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Threads with any tracked state.
    pub fn thread_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .snapshots
            .iter()
            .map(|e| e.key().clone())
            .chain(self.evolution.iter().map(|e| e.key().clone()))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Drop everything held for a thread. Returns whether anything existed.
    pub fn cleanup(&self, thread_id: &str) -> bool {
        let had_snapshots = self.snapshots.remove(thread_id).is_some();
        let had_evolution = self.evolution.remove(thread_id).is_some();
        self.adjustments.remove(thread_id);
        self.invalidate_consistency(thread_id);
        had_snapshots || had_evolution
    }
}
