//! Switching policy configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-thread switching policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchingConfig {
    /// Whether switching is considered at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Switches allowed over the life of one thread.
    #[serde(default = "default_max_switches")]
    pub max_switches_per_conversation: u32,
    /// Cooldown after a switch, in seconds.
    #[serde(default = "default_min_interval")]
    pub min_switch_interval_secs: u64,
    /// Minimum confidence an alternative needs to be recommended.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Minimum overall-score gain over the current persona.
    #[serde(default = "default_min_improvement")]
    pub min_improvement: f64,
    /// Tell the user when the persona changes.
    #[serde(default)]
    pub notify_user: bool,
    /// Carry conversation history into the new persona's prompt.
    #[serde(default = "default_true")]
    pub preserve_context: bool,
}

fn default_true() -> bool { true }
fn default_max_switches() -> u32 { 3 }
fn default_min_interval() -> u64 { 120 }
fn default_confidence_threshold() -> f64 { 0.75 }
fn default_min_improvement() -> f64 { 0.15 }

impl Default for SwitchingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_switches_per_conversation: default_max_switches(),
            min_switch_interval_secs: default_min_interval(),
            confidence_threshold: default_confidence_threshold(),
            min_improvement: default_min_improvement(),
            notify_user: false,
            preserve_context: true,
        }
    }
}

impl SwitchingConfig {
    pub fn min_switch_interval(&self) -> Duration {
        Duration::from_secs(self.min_switch_interval_secs)
    }
}
