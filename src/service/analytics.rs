//! Cross-thread switching analytics.

use chrono::Utc;

use super::{ContextAwareSwitchingService, SwitchEffectiveness, SwitchingAnalytics};

impl ContextAwareSwitchingService {
    /// Aggregate switch counts, triggers and effectiveness over every thread.
    pub fn analytics(&self) -> SwitchingAnalytics {
        let mut analytics = SwitchingAnalytics {
            generated_at: Some(Utc::now()),
            ..Default::default()
        };
        let mut impacts = Vec::new();
        let mut alignments = Vec::new();

        for thread_id in self.thread_ids() {
            analytics.thread_count += 1;

            let switches = self
                .orchestrator
                .thread_state(&thread_id)
                .map(|s| s.switch_count as usize)
                .unwrap_or(0);
            analytics.total_switches += switches;
            analytics.switches_per_thread.insert(thread_id.clone(), switches);

            if let Some(evolution) = self.state.evolution(&thread_id) {
                for (trigger, count) in &evolution.trends.trigger_histogram {
                    *analytics.trigger_histogram.entry(trigger.clone()).or_insert(0) += count;
                }
                for (persona, count) in &evolution.trends.persona_usage {
                    *analytics.persona_usage.entry(persona.clone()).or_insert(0) += count;
                }
                impacts.extend(
                    evolution
                        .timeline
                        .iter()
                        .filter(|c| c.is_switch())
                        .filter_map(|c| c.impact),
                );
            }

            if let Some(latest) = self.state.latest_snapshot(&thread_id) {
                alignments.push(latest.alignment());
            }
        }

        let positive = impacts.iter().filter(|i| **i > 0.0).count();
        analytics.effectiveness = SwitchEffectiveness {
            measured_switches: impacts.len(),
            positive_switches: positive,
            success_rate: (!impacts.is_empty()).then(|| positive as f64 / impacts.len() as f64),
            average_impact: (!impacts.is_empty()).then(|| impacts.iter().sum::<f64>() / impacts.len() as f64),
        };
        analytics.average_alignment =
            (!alignments.is_empty()).then(|| alignments.iter().sum::<f64>() / alignments.len() as f64);
        analytics
    }
}
