//! Pipeline-stage interceptors.
//!
//! Every stage of a service turn runs through [`HookRegistry::run`] or
//! [`HookRegistry::run_result`], which time the stage and notify registered
//! hooks before and after it:
//!
//! ```text
//!   before_stage(stage, thread) ─▶ stage future ─▶ after_stage(stage, thread, outcome)
//! ```
//!
//! Hooks are advisory. A hook error is logged and the pipeline continues.

pub mod tracing_hook;

use std::fmt;
use std::future::Future;
use std::time::Instant;

use serde::{Deserialize, Serialize};

pub use tracing_hook::TracingHook;

// ---------------------------------------------------------------------------
// Stages & outcomes
// ---------------------------------------------------------------------------

/// A stage of the per-turn pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Snapshot,
    Analyze,
    ScoreCurrent,
    Decide,
    Smooth,
    Record,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Analyze => "analyze",
            Self::ScoreCurrent => "score_current",
            Self::Decide => "decide",
            Self::Smooth => "smooth",
            Self::Record => "record",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a finished stage reports to hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub elapsed_ms: u64,
    pub succeeded: bool,
    /// Error text for a failed stage.
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// HookError
// ---------------------------------------------------------------------------

/// Error returned by a hook. Logged, never propagated.
#[derive(Debug, Clone)]
pub struct HookError {
    pub message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HookError: {}", self.message)
    }
}

impl std::error::Error for HookError {}

impl From<&str> for HookError {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// PipelineHook
// ---------------------------------------------------------------------------

/// Observer of pipeline stages. Both methods default to no-ops.
pub trait PipelineHook: Send + Sync + 'static {
    fn before_stage(&self, _stage: PipelineStage, _thread_id: &str) -> Result<(), HookError> {
        Ok(())
    }

    fn after_stage(
        &self,
        _stage: PipelineStage,
        _thread_id: &str,
        _outcome: &StageOutcome,
    ) -> Result<(), HookError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HookRegistry
// ---------------------------------------------------------------------------

/// Hooks invoked in registration order.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Box<dyn PipelineHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: impl PipelineHook) {
        self.hooks.push(Box::new(hook));
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run an infallible stage.
    pub async fn run<F, T>(&self, stage: PipelineStage, thread_id: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        self.invoke_before(stage, thread_id);
        let started = Instant::now();
        let value = fut.await;
        self.invoke_after(
            stage,
            thread_id,
            &StageOutcome {
                elapsed_ms: started.elapsed().as_millis() as u64,
                succeeded: true,
                error: None,
            },
        );
        value
    }

    /// Run a fallible stage; an `Err` is reported to hooks and returned.
    pub async fn run_result<F, T, E>(&self, stage: PipelineStage, thread_id: &str, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.invoke_before(stage, thread_id);
        let started = Instant::now();
        let result = fut.await;
        self.invoke_after(
            stage,
            thread_id,
            &StageOutcome {
                elapsed_ms: started.elapsed().as_millis() as u64,
                succeeded: result.is_ok(),
                error: result.as_ref().err().map(|e| e.to_string()),
            },
        );
        result
    }

    pub fn invoke_before(&self, stage: PipelineStage, thread_id: &str) {
        for hook in &self.hooks {
            if let Err(e) = hook.before_stage(stage, thread_id) {
                log::warn!("PipelineHook.before_stage({}) error: {}", stage, e);
            }
        }
    }

    pub fn invoke_after(&self, stage: PipelineStage, thread_id: &str, outcome: &StageOutcome) {
        for hook in &self.hooks {
            if let Err(e) = hook.after_stage(stage, thread_id, outcome) {
                log::warn!("PipelineHook.after_stage({}) error: {}", stage, e);
            }
        }
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
