//! Service and per-thread configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::StateTrackerConfig;
use crate::switching::SwitchingConfig;
use crate::transition::{TransitionConfig, TransitionType};
use crate::utilities::config::merge_overrides;
use crate::utilities::errors::ConfigError;

/// Transition settings a thread pins instead of using the auto-tuned ones.
///
/// Every field left `None` keeps the tuned value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionOverrides {
    #[serde(default)]
    pub intensity: Option<f64>,
    #[serde(default)]
    pub approach: Option<TransitionType>,
    #[serde(default)]
    pub notify_user: Option<bool>,
    #[serde(default)]
    pub preserve_context: Option<bool>,
    #[serde(default)]
    pub stabilization_messages: Option<u32>,
}

impl TransitionOverrides {
    pub fn apply(&self, mut tuned: TransitionConfig) -> TransitionConfig {
        if let Some(intensity) = self.intensity {
            tuned.intensity = intensity;
        }
        if self.approach.is_some() {
            tuned.approach = self.approach;
        }
        if let Some(notify) = self.notify_user {
            tuned.notify_user = notify;
        }
        if let Some(preserve) = self.preserve_context {
            tuned.preserve_context = preserve;
        }
        if let Some(n) = self.stabilization_messages {
            tuned.stabilization_messages = n;
        }
        tuned
    }
}

/// Configuration of one conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadConfiguration {
    #[serde(default)]
    pub switching: SwitchingConfig,
    #[serde(default)]
    pub transition: TransitionOverrides,
    /// Messages between periodic snapshots.
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval: usize,
    /// Current-persona score below which the orchestrator is consulted even
    /// when no trigger fired.
    #[serde(default = "default_min_compatibility")]
    pub min_compatibility_score: f64,
    #[serde(default = "default_true")]
    pub enable_transition_smoothing: bool,
    #[serde(default = "default_true")]
    pub enable_state_tracking: bool,
    #[serde(default = "default_monitoring_interval")]
    pub monitoring_interval_secs: u64,
}

fn default_snapshot_interval() -> usize { 5 }
fn default_min_compatibility() -> f64 { 0.6 }
fn default_true() -> bool { true }
fn default_monitoring_interval() -> u64 { 60 }

impl Default for ThreadConfiguration {
    fn default() -> Self {
        Self {
            switching: SwitchingConfig::default(),
            transition: TransitionOverrides::default(),
            snapshot_interval: default_snapshot_interval(),
            min_compatibility_score: default_min_compatibility(),
            enable_transition_smoothing: true,
            enable_state_tracking: true,
            monitoring_interval_secs: default_monitoring_interval(),
        }
    }
}

impl ThreadConfiguration {
    /// Deep-merge `overrides` into this configuration.
    ///
    /// ```ignore
    /// let cfg = ThreadConfiguration::default()
    ///     .merged(&json!({ "switching": { "max_switches_per_conversation": 1 } }))?;
    /// ```
    pub fn merged(&self, overrides: &Value) -> Result<Self, ConfigError> {
        let merged: Self = merge_overrides(self, overrides)?;
        merged.validate()?;
        Ok(merged)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let unit = |path: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ConfigError::InvalidValue {
                    path: path.to_string(),
                    message: format!("{} is outside [0, 1]", v),
                })
            }
        };
        unit("min_compatibility_score", self.min_compatibility_score)?;
        unit("switching.confidence_threshold", self.switching.confidence_threshold)?;
        unit("switching.min_improvement", self.switching.min_improvement)?;
        if let Some(intensity) = self.transition.intensity {
            unit("transition.intensity", intensity)?;
        }
        if self.snapshot_interval == 0 {
            return Err(ConfigError::InvalidValue {
                path: "snapshot_interval".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Construction-time configuration of the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Starting configuration of every new thread.
    #[serde(default)]
    pub thread_defaults: ThreadConfiguration,
    #[serde(default)]
    pub state: StateTrackerConfig,
}

impl ServiceConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}
