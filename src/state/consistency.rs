//! Consistency analysis over a thread's snapshot chain.
//!
//! Adjacent snapshots are compared pairwise. A pair scores the mean of
//! persona identity (1.0 same, 0.0 changed) and alignment stability
//! (1 - |Δ context alignment|); the thread score is the mean over pairs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::{SnapshotReason, StateSnapshot};
use crate::utilities::string_utils::clamp_unit;

/// Alignment drop between adjacent snapshots that gets flagged.
const ALIGNMENT_DROP: f64 = 0.3;
/// Alignment drop escalated to high severity.
const SEVERE_ALIGNMENT_DROP: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl DataQuality {
    pub fn from_count(snapshots: usize) -> Self {
        match snapshots {
            0..=1 => Self::Poor,
            2..=4 => Self::Fair,
            5..=9 => Self::Good,
            _ => Self::Excellent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyType {
    /// Persona changed without a switch-reason snapshot.
    UnexplainedPersonaChange,
    PerformanceDrop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inconsistency {
    pub kind: InconsistencyType,
    pub severity: Severity,
    pub snapshot_id: String,
    pub previous_snapshot_id: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyMetrics {
    /// Share of adjacent pairs keeping the same persona.
    pub persona_stability: f64,
    /// Mean of 1 - |Δ alignment| over adjacent pairs.
    pub performance_stability: f64,
    pub average_alignment: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyAnalysis {
    pub thread_id: String,
    /// Number of most recent snapshots requested, `None` for all.
    pub window: Option<usize>,
    pub snapshot_count: usize,
    pub overall_consistency: f64,
    pub data_quality: DataQuality,
    pub metrics: ConsistencyMetrics,
    /// Most severe first.
    pub inconsistencies: Vec<Inconsistency>,
    pub recommendations: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}

impl ConsistencyAnalysis {
    pub fn has_issues(&self) -> bool {
        !self.inconsistencies.is_empty()
    }
}

/// Analyze `snapshots`, oldest first.
pub fn analyze(thread_id: &str, window: Option<usize>, snapshots: &[&StateSnapshot]) -> ConsistencyAnalysis {
    let count = snapshots.len();
    let average_alignment = if count == 0 {
        0.0
    } else {
        snapshots.iter().map(|s| s.alignment()).sum::<f64>() / count as f64
    };

    if count < 2 {
        return ConsistencyAnalysis {
            thread_id: thread_id.to_string(),
            window,
            snapshot_count: count,
            overall_consistency: 1.0,
            data_quality: DataQuality::Poor,
            metrics: ConsistencyMetrics {
                persona_stability: 1.0,
                performance_stability: 1.0,
                average_alignment,
            },
            inconsistencies: Vec::new(),
            recommendations: vec!["Insufficient data: at least two snapshots are needed".to_string()],
            analyzed_at: Utc::now(),
        };
    }

    let mut identity_total = 0.0;
    let mut stability_total = 0.0;
    let mut inconsistencies = Vec::new();

    for pair in snapshots.windows(2) {
        let (prev, curr) = (pair[0], pair[1]);
        let same_persona = prev.persona_id() == curr.persona_id();
        identity_total += if same_persona { 1.0 } else { 0.0 };
        stability_total += clamp_unit(1.0 - (prev.alignment() - curr.alignment()).abs());

        if !same_persona && curr.metadata.reason != SnapshotReason::PersonaSwitch {
            inconsistencies.push(Inconsistency {
                kind: InconsistencyType::UnexplainedPersonaChange,
                severity: Severity::High,
                snapshot_id: curr.id.clone(),
                previous_snapshot_id: prev.id.clone(),
                description: format!(
                    "Persona changed from {} to {} without a recorded switch",
                    prev.persona_id(),
                    curr.persona_id()
                ),
            });
        }

        let drop = prev.alignment() - curr.alignment();
        if drop > ALIGNMENT_DROP {
            inconsistencies.push(Inconsistency {
                kind: InconsistencyType::PerformanceDrop,
                severity: if drop > SEVERE_ALIGNMENT_DROP { Severity::High } else { Severity::Medium },
                snapshot_id: curr.id.clone(),
                previous_snapshot_id: prev.id.clone(),
                description: format!("Context alignment dropped by {:.2}", drop),
            });
        }
    }

    let pairs = (count - 1) as f64;
    let persona_stability = identity_total / pairs;
    let performance_stability = stability_total / pairs;
    let overall_consistency = clamp_unit((persona_stability + performance_stability) / 2.0);

    // Stable sort keeps chronological order within a severity.
    inconsistencies.sort_by(|a, b| b.severity.cmp(&a.severity));

    let metrics = ConsistencyMetrics {
        persona_stability,
        performance_stability,
        average_alignment,
    };

    ConsistencyAnalysis {
        thread_id: thread_id.to_string(),
        window,
        snapshot_count: count,
        overall_consistency,
        data_quality: DataQuality::from_count(count),
        recommendations: recommendations(&metrics, &inconsistencies),
        metrics,
        inconsistencies,
        analyzed_at: Utc::now(),
    }
}

fn recommendations(metrics: &ConsistencyMetrics, inconsistencies: &[Inconsistency]) -> Vec<String> {
    let mut out = Vec::new();
    if inconsistencies
        .iter()
        .any(|i| i.kind == InconsistencyType::UnexplainedPersonaChange)
    {
        out.push("Route persona changes through the switching orchestrator so they are recorded".to_string());
    }
    if inconsistencies.iter().any(|i| i.kind == InconsistencyType::PerformanceDrop) {
        out.push("Review recent turns where context alignment dropped sharply".to_string());
    }
    if metrics.persona_stability < 0.5 {
        out.push("Persona changes frequently; consider a longer cooldown".to_string());
    }
    if metrics.average_alignment < 0.5 {
        out.push("Active personas fit this conversation poorly; review candidate personas".to_string());
    }
    out
}
