//! Per-thread monitoring: a recurring sweep that layers performance trends
//! and consistency on top of the orchestrator's switch opportunities.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;

use super::{ContextAwareSwitchingService, MonitoringReport};
use crate::state::PerformanceDirection;
use crate::utilities::errors::SwitchError;

impl ContextAwareSwitchingService {
    /// Start a recurring monitor for a thread. `interval` defaults to the
    /// thread's `monitoring_interval_secs`. Returns false if one is running.
    ///
    /// The task holds only a weak reference and ends when the service drops.
    pub fn start_monitoring(self: &Arc<Self>, thread_id: &str, interval: Option<Duration>) -> bool {
        if self.is_monitoring(thread_id) {
            return false;
        }
        let period = interval.unwrap_or_else(|| {
            Duration::from_secs(self.configuration(thread_id).monitoring_interval_secs.max(1))
        });

        let service = Arc::downgrade(self);
        let id = thread_id.to_string();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(service) = service.upgrade() else {
                    break;
                };
                if let Err(e) = service.monitor(&id).await {
                    log::warn!("Monitoring sweep failed for thread {}: {}", id, e);
                }
            }
        });

        self.monitors.insert(thread_id.to_string(), handle);
        log::info!("Started monitoring thread {} every {:?}", thread_id, period);
        true
    }

    /// Stop a thread's monitor. Idempotent; returns whether one was running.
    pub fn stop_monitoring(&self, thread_id: &str) -> bool {
        match self.monitors.remove(thread_id) {
            Some((_, handle)) => {
                handle.abort();
                log::info!("Stopped monitoring thread {}", thread_id);
                true
            }
            None => false,
        }
    }

    pub fn is_monitoring(&self, thread_id: &str) -> bool {
        self.monitors
            .get(thread_id)
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Latest report produced by [`Self::monitor`].
    pub fn monitoring_report(&self, thread_id: &str) -> Option<MonitoringReport> {
        self.reports.get(thread_id).map(|r| r.value().clone())
    }

    /// Run one monitoring sweep over the thread's last seen history.
    pub async fn monitor(&self, thread_id: &str) -> Result<MonitoringReport, SwitchError> {
        let (persona_id, messages) = self
            .runtimes
            .get(thread_id)
            .map(|r| (r.active_persona_id.clone(), r.messages.clone()))
            .ok_or_else(|| SwitchError::InvalidArgument(format!("Unknown thread: {}", thread_id)))?;
        let config = self.configuration(thread_id);

        let opportunities = self
            .orchestrator
            .find_opportunities(&messages, &persona_id, Some(thread_id))
            .await?;
        let performance = self.state.performance_trend(thread_id);
        let consistency = self.state.analyze_consistency(thread_id, None);
        let status = self.orchestrator.thread_status(thread_id, Some(&config.switching));

        let mut recommendations = Vec::new();
        if performance.direction == PerformanceDirection::Declining {
            recommendations.push("Context alignment is declining; review the active persona".to_string());
        }
        if !opportunities.is_empty() {
            if status.switch_count >= status.max_switches {
                recommendations.push(format!(
                    "{} switch opportunity window(s) found but the switch limit is reached",
                    opportunities.len()
                ));
            } else if let Some(candidate) = opportunities
                .iter()
                .rev()
                .find_map(|o| o.suggested_persona_id.as_deref())
            {
                recommendations.push(format!(
                    "{} switch opportunity window(s) found; latest candidate is {}",
                    opportunities.len(),
                    candidate
                ));
            }
        }
        if consistency.has_issues() {
            recommendations.push(format!(
                "Investigate {} consistency issue(s)",
                consistency.inconsistencies.len()
            ));
        }

        let report = MonitoringReport {
            thread_id: thread_id.to_string(),
            active_persona_id: persona_id,
            status,
            performance,
            consistency,
            opportunities,
            recommendations,
            generated_at: Utc::now(),
        };
        self.reports.insert(thread_id.to_string(), report.clone());
        log::debug!(
            "Monitoring thread {}: {} opportunities, {:?} performance",
            thread_id,
            report.opportunities.len(),
            report.performance.direction
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::catalog::CASUAL_COMPANION;
    use crate::service::tests::{service, technical_chat};
    use crate::service::TurnRequest;
    use crate::types::Message;
    use serde_json::json;

    #[tokio::test]
    async fn test_monitor_unknown_thread_is_error() {
        let svc = service();
        assert!(matches!(svc.monitor("nope").await, Err(SwitchError::InvalidArgument(_))));
        assert!(svc.monitoring_report("nope").is_none());
    }

    #[tokio::test]
    async fn test_monitor_reports_opportunities() {
        let svc = service();
        svc.set_configuration("t1", &json!({"switching": {"max_switches_per_conversation": 0}}))
            .unwrap();
        let mut messages = vec![Message::user("Hi there! How are you?")];
        messages.extend(technical_chat());
        svc.process_turn(TurnRequest::new("t1", messages, CASUAL_COMPANION))
            .await
            .unwrap();

        let report = svc.monitor("t1").await.unwrap();
        assert_eq!(report.active_persona_id, CASUAL_COMPANION);
        assert!(!report.opportunities.is_empty());
        assert!(report.recommendations.iter().any(|r| r.contains("switch limit")));
        assert_eq!(svc.monitoring_report("t1"), Some(report));
    }

    #[tokio::test]
    async fn test_start_stop_monitoring_is_idempotent() {
        let svc = Arc::new(service());
        svc.process_turn(TurnRequest::new("t1", vec![Message::user("Hi there!")], CASUAL_COMPANION))
            .await
            .unwrap();

        assert!(svc.start_monitoring("t1", Some(Duration::from_millis(10))));
        assert!(!svc.start_monitoring("t1", Some(Duration::from_millis(10))));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(svc.monitoring_report("t1").is_some());

        assert!(svc.stop_monitoring("t1"));
        assert!(!svc.stop_monitoring("t1"));
        assert!(!svc.is_monitoring("t1"));
    }
}
