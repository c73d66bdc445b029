//! `tracing` observer for pipeline stages.

use super::{HookError, PipelineHook, PipelineStage, StageOutcome};

/// Emits one `pipeline_stage` span per stage with its timing and outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHook;

impl PipelineHook for TracingHook {
    fn before_stage(&self, stage: PipelineStage, thread_id: &str) -> Result<(), HookError> {
        tracing::debug!(stage = stage.as_str(), thread_id, "stage started");
        Ok(())
    }

    fn after_stage(
        &self,
        stage: PipelineStage,
        thread_id: &str,
        outcome: &StageOutcome,
    ) -> Result<(), HookError> {
        let span = tracing::info_span!("pipeline_stage", stage = stage.as_str(), thread_id);
        span.in_scope(|| match &outcome.error {
            None => tracing::info!(elapsed_ms = outcome.elapsed_ms, "stage completed"),
            Some(error) => tracing::warn!(elapsed_ms = outcome.elapsed_ms, %error, "stage failed"),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::HookRegistry;

    #[tokio::test]
    async fn test_tracing_hook_without_subscriber() {
        let mut registry = HookRegistry::new();
        registry.register(TracingHook);
        let out = registry
            .run_result(PipelineStage::Smooth, "t", async { Ok::<_, String>(1) })
            .await;
        assert_eq!(out, Ok(1));
    }
}
