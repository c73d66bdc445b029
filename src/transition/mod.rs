//! Transition smoother: eases the jump between two personas.
//!
//! The transition type is picked from the configured intensity and the trait
//! distance between the two personas:
//!
//! | condition                                   | type     |
//! |---------------------------------------------|----------|
//! | distance < 0.2 and intensity < 0.3          | seamless |
//! | (intensity + distance) / 2 < 0.5            | gradual  |
//! | (intensity + distance) / 2 < 0.75           | bridged  |
//! | otherwise                                   | explicit |

pub mod types;

use std::sync::Arc;

use chrono::Utc;

use crate::interfaces::PersonaStore;
use crate::switching::SwitchApproach;
use crate::types::{trait_distance, Message, PersonaDefinition, PersonaTrait};
use crate::utilities::errors::LookupError;
use crate::utilities::string_utils::{clamp_unit, truncate_chars};

pub use types::{
    BridgeKind, BridgingElement, ConversationStats, SmoothTransition, TransitionConfig,
    TransitionMetadata, TransitionType, UserImpact,
};

const BLEND_TRAITS: usize = 3;
const CARRY_CHARS: usize = 160;

/// Pick a transition type from trait distance and intensity.
///
/// Only a mean of distance and intensity of at least 0.5 yields a visible
/// type (Bridged or Explicit); below that the switch is Gradual.
pub fn select_transition_type(distance: f64, intensity: f64) -> TransitionType {
    let combined = (intensity + distance) / 2.0;
    if distance < 0.2 && intensity < 0.3 {
        TransitionType::Seamless
    } else if combined < 0.5 {
        TransitionType::Gradual
    } else if combined < 0.75 {
        TransitionType::Bridged
    } else {
        TransitionType::Explicit
    }
}

impl ConversationStats {
    pub fn from_messages(messages: &[Message], switch_count: u32) -> Self {
        let average_message_length = if messages.is_empty() {
            0.0
        } else {
            messages.iter().map(|m| m.content.chars().count()).sum::<usize>() as f64
                / messages.len() as f64
        };
        Self {
            message_count: messages.len(),
            switch_count,
            average_message_length,
            recent_sentiment: None,
        }
    }
}

/// Builds bridge prompts between personas.
#[derive(Clone)]
pub struct TransitionSmoother {
    store: Arc<dyn PersonaStore>,
}

impl TransitionSmoother {
    pub fn new(store: Arc<dyn PersonaStore>) -> Self {
        Self { store }
    }

    /// Rewrite `original_prompt` so that it bridges `from_id` to `to_id`.
    pub async fn create_smooth_transition(
        &self,
        from_id: &str,
        to_id: &str,
        original_prompt: &str,
        recent_messages: &[Message],
        config: &TransitionConfig,
    ) -> Result<SmoothTransition, LookupError> {
        let from = self.store.find_one(from_id).await?;
        let to = self.store.find_one(to_id).await?;
        Ok(self.smooth(&from, &to, original_prompt, recent_messages, config))
    }

    /// Pure core of [`Self::create_smooth_transition`].
    pub fn smooth(
        &self,
        from: &PersonaDefinition,
        to: &PersonaDefinition,
        original_prompt: &str,
        recent_messages: &[Message],
        config: &TransitionConfig,
    ) -> SmoothTransition {
        let intensity = clamp_unit(config.intensity);
        let distance = trait_distance(from, to);
        let transition_type = config
            .approach
            .unwrap_or_else(|| select_transition_type(distance, intensity));

        let mut approach = transition_type.approach();
        if config.notify_user && approach == SwitchApproach::Seamless {
            approach = SwitchApproach::Acknowledged;
        }

        let mut bridging_elements = Vec::new();

        if approach.is_visible() {
            bridging_elements.push(BridgingElement {
                kind: BridgeKind::Acknowledgment,
                content: format!(
                    "Briefly acknowledge the change of focus before continuing as {}.",
                    to.name
                ),
            });
        }

        bridging_elements.push(BridgingElement {
            kind: BridgeKind::TraitBlend,
            content: blend_description(from, to, intensity),
        });

        if config.preserve_context {
            if let Some(last) = recent_messages.iter().rev().find(|m| m.is_user()) {
                bridging_elements.push(BridgingElement {
                    kind: BridgeKind::ContextCarry,
                    content: format!(
                        "Continue from the user's last message: \"{}\"",
                        truncate_chars(last.content.trim(), CARRY_CHARS)
                    ),
                });
            }
        }

        if transition_type >= TransitionType::Gradual {
            bridging_elements.push(BridgingElement {
                kind: BridgeKind::ToneShift,
                content: format!(
                    "Shift tone from {} toward {} over the next {} message(s).",
                    trait_phrase(&from.top_traits(BLEND_TRAITS)),
                    trait_phrase(&to.top_traits(BLEND_TRAITS)),
                    config.stabilization_messages.max(1)
                ),
            });
        }

        let smoothed_prompt = build_bridge_prompt(from, to, transition_type, &bridging_elements, original_prompt);

        let user_message = match approach {
            SwitchApproach::Seamless => None,
            SwitchApproach::Acknowledged => Some(format!(
                "I'll take a more {} approach for this part of our conversation.",
                to.top_traits(1)
                    .first()
                    .map(|t| t.value.clone())
                    .unwrap_or_else(|| to.category.as_str().to_string())
            )),
            SwitchApproach::Explicit => Some(if to.description.is_empty() {
                format!("Switching to {}.", to.name)
            } else {
                format!("Switching to {}: {}", to.name, to.description)
            }),
        };

        let smoothing_quality = smoothing_quality(distance, transition_type, bridging_elements.len());
        let user_impact = UserImpact::from_score(impact_score(distance, approach));

        log::debug!(
            "Transition {} -> {}: {} ({}), distance {:.2}, quality {:.2}",
            from.id,
            to.id,
            transition_type.as_str(),
            approach.as_str(),
            distance,
            smoothing_quality
        );

        SmoothTransition {
            smoothed_prompt,
            bridging_elements,
            metadata: TransitionMetadata {
                from_persona_id: from.id.clone(),
                to_persona_id: to.id.clone(),
                transition_type,
                approach,
                trait_distance: distance,
                intensity,
                smoothing_quality,
                user_impact,
                stabilization_messages: config.stabilization_messages,
                created_at: Utc::now(),
            },
            user_message,
        }
    }

    /// Tune a transition for two personas: larger trait distance means higher
    /// intensity, more stabilization messages and, past a point, notifying
    /// the user.
    pub async fn optimize_transition_config(
        &self,
        from_id: &str,
        to_id: &str,
        stats: &ConversationStats,
    ) -> Result<TransitionConfig, LookupError> {
        let from = self.store.find_one(from_id).await?;
        let to = self.store.find_one(to_id).await?;
        Ok(optimize_for_distance(trait_distance(&from, &to), stats))
    }
}

/// Config tuned for a given trait distance.
pub fn optimize_for_distance(distance: f64, stats: &ConversationStats) -> TransitionConfig {
    let distance = clamp_unit(distance);
    TransitionConfig {
        intensity: clamp_unit(0.3 + 0.6 * distance),
        approach: None,
        notify_user: distance > 0.6 || stats.switch_count >= 2,
        preserve_context: true,
        stabilization_messages: 1 + (4.0 * distance).round() as u32,
    }
}

fn trait_phrase(traits: &[&PersonaTrait]) -> String {
    if traits.is_empty() {
        return "a neutral tone".to_string();
    }
    traits
        .iter()
        .map(|t| format!("{} {}", t.value, t.name.replace('_', " ")))
        .collect::<Vec<_>>()
        .join(", ")
}

fn blend_description(from: &PersonaDefinition, to: &PersonaDefinition, intensity: f64) -> String {
    let mut names: Vec<String> = from
        .top_traits(BLEND_TRAITS)
        .into_iter()
        .chain(to.top_traits(BLEND_TRAITS))
        .map(|t| t.name.to_lowercase())
        .collect();
    names.sort();
    names.dedup();

    let mut blended: Vec<(String, f64)> = names
        .into_iter()
        .map(|name| {
            let w = (1.0 - intensity) * from.trait_weight(&name) + intensity * to.trait_weight(&name);
            (name, (w * 100.0).round() / 100.0)
        })
        .filter(|(_, w)| *w > 0.0)
        .collect();
    blended.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    let parts: Vec<String> = blended
        .iter()
        .map(|(name, w)| format!("{}={:.2}", name.replace('_', " "), w))
        .collect();
    format!("Blend traits: {}", parts.join(", "))
}

fn build_bridge_prompt(
    from: &PersonaDefinition,
    to: &PersonaDefinition,
    transition_type: TransitionType,
    elements: &[BridgingElement],
    original_prompt: &str,
) -> String {
    let mut sections = Vec::with_capacity(elements.len() + 3);
    sections.push(format!(
        "From: {} ({})",
        from.name,
        trait_phrase(&from.top_traits(BLEND_TRAITS))
    ));
    sections.push(format!(
        "To: {} ({})",
        to.name,
        trait_phrase(&to.top_traits(BLEND_TRAITS))
    ));
    sections.push(format!("Style: {}", transition_type.as_str()));
    sections.extend(elements.iter().map(|e| e.content.clone()));

    let bridge = format!("[Persona Transition]\n\n{}", sections.join("\n"));
    if original_prompt.trim().is_empty() {
        bridge
    } else {
        format!("{}\n\n{}", bridge, original_prompt)
    }
}

fn smoothing_quality(distance: f64, transition_type: TransitionType, elements: usize) -> f64 {
    let gap_factor = match transition_type {
        TransitionType::Seamless => 0.8,
        TransitionType::Gradual => 0.5,
        TransitionType::Bridged => 0.35,
        TransitionType::Explicit => 0.25,
    };
    let bridge_bonus = (0.05 * elements as f64).min(0.15);
    clamp_unit(1.0 - distance * gap_factor + bridge_bonus)
}

fn impact_score(distance: f64, approach: SwitchApproach) -> f64 {
    let visibility = match approach {
        SwitchApproach::Seamless => 0.0,
        SwitchApproach::Acknowledged => 0.2,
        SwitchApproach::Explicit => 0.4,
    };
    clamp_unit(distance * 0.6 + visibility)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::catalog::{
        ANALYTICAL_ADVISOR, CASUAL_COMPANION, CREATIVE_PARTNER, DEFAULT_ASSISTANT, TECHNICAL_EXPERT,
    };
    use crate::interfaces::{builtin_personas, InMemoryPersonaStore};
    use crate::types::PersonaCategory;

    fn smoother() -> TransitionSmoother {
        TransitionSmoother::new(Arc::new(InMemoryPersonaStore::with_personas(builtin_personas())))
    }

    #[test]
    fn test_type_selection_table() {
        assert_eq!(select_transition_type(0.1, 0.2), TransitionType::Seamless);
        assert_eq!(select_transition_type(0.1, 0.5), TransitionType::Gradual);
        assert_eq!(select_transition_type(0.76, 0.6), TransitionType::Bridged);
        assert_eq!(select_transition_type(0.9, 0.9), TransitionType::Explicit);
    }

    #[tokio::test]
    async fn test_distant_personas_are_not_seamless() {
        let config = TransitionConfig {
            intensity: 0.6,
            ..Default::default()
        };
        let t = smoother()
            .create_smooth_transition(
                CASUAL_COMPANION,
                TECHNICAL_EXPERT,
                "Explain the algorithm.",
                &[Message::user("How does consensus work?")],
                &config,
            )
            .await
            .unwrap();

        assert_ne!(t.metadata.approach, SwitchApproach::Seamless);
        assert!(t.user_message.is_some());
        assert!(t.smoothed_prompt.starts_with("[Persona Transition]"));
        assert!(t.smoothed_prompt.ends_with("Explain the algorithm."));
        assert!(t
            .bridging_elements
            .iter()
            .any(|e| e.kind == BridgeKind::ContextCarry && e.content.contains("consensus")));
    }

    #[tokio::test]
    async fn test_moderate_distance_stays_gradual() {
        assert_eq!(select_transition_type(0.39, 0.6), TransitionType::Gradual);
        assert_eq!(select_transition_type(0.4, 0.6), TransitionType::Bridged);

        let config = TransitionConfig {
            intensity: 0.6,
            ..Default::default()
        };
        let t = smoother()
            .create_smooth_transition(CASUAL_COMPANION, CREATIVE_PARTNER, "", &[], &config)
            .await
            .unwrap();
        assert!((0.2..0.4).contains(&t.metadata.trait_distance), "{}", t.metadata.trait_distance);
        assert_eq!(t.metadata.transition_type, TransitionType::Gradual);
        assert_eq!(t.metadata.approach, SwitchApproach::Seamless);
        assert!(t.user_message.is_none());
    }

    #[tokio::test]
    async fn test_user_message_only_when_visible() {
        let s = smoother();
        for intensity in [0.0, 0.2, 0.4, 0.6, 0.8, 1.0] {
            for (from, to) in [
                (DEFAULT_ASSISTANT, ANALYTICAL_ADVISOR),
                (CASUAL_COMPANION, TECHNICAL_EXPERT),
                (TECHNICAL_EXPERT, ANALYTICAL_ADVISOR),
            ] {
                let config = TransitionConfig {
                    intensity,
                    ..Default::default()
                };
                let t = s.create_smooth_transition(from, to, "", &[], &config).await.unwrap();
                assert_eq!(t.user_message.is_some(), t.metadata.approach.is_visible());
                assert!((0.0..=1.0).contains(&t.metadata.smoothing_quality));
            }
        }
    }

    #[tokio::test]
    async fn test_forced_type_and_notify() {
        let s = smoother();
        let config = TransitionConfig {
            approach: Some(TransitionType::Seamless),
            notify_user: true,
            ..Default::default()
        };
        let t = s
            .create_smooth_transition(CASUAL_COMPANION, TECHNICAL_EXPERT, "", &[], &config)
            .await
            .unwrap();
        assert_eq!(t.metadata.transition_type, TransitionType::Seamless);
        assert_eq!(t.metadata.approach, SwitchApproach::Acknowledged);
        assert!(t.user_message.is_some());
    }

    #[tokio::test]
    async fn test_identical_personas_are_seamless() {
        let s = smoother();
        let config = TransitionConfig {
            intensity: 0.1,
            ..Default::default()
        };
        let t = s
            .create_smooth_transition(TECHNICAL_EXPERT, TECHNICAL_EXPERT, "", &[], &config)
            .await
            .unwrap();
        assert_eq!(t.metadata.transition_type, TransitionType::Seamless);
        assert_eq!(t.metadata.user_impact, UserImpact::Minimal);
        assert!(t.user_message.is_none());
        assert_eq!(t.metadata.trait_distance, 0.0);
    }

    #[tokio::test]
    async fn test_unknown_persona_is_lookup_error() {
        let err = smoother()
            .create_smooth_transition("ghost", TECHNICAL_EXPERT, "", &[], &TransitionConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err, LookupError::not_found("ghost"));
    }

    #[tokio::test]
    async fn test_optimize_scales_with_distance() {
        let s = smoother();
        let stats = ConversationStats::from_messages(&[Message::user("hi")], 0);
        let near = s
            .optimize_transition_config(TECHNICAL_EXPERT, ANALYTICAL_ADVISOR, &stats)
            .await
            .unwrap();
        let far = s
            .optimize_transition_config(CASUAL_COMPANION, TECHNICAL_EXPERT, &stats)
            .await
            .unwrap();
        assert!(far.intensity > near.intensity);
        assert!(far.stabilization_messages > near.stabilization_messages);
        assert!(far.notify_user);
        assert!(!near.notify_user);
    }

    #[test]
    fn test_blend_moves_toward_target() {
        let a = PersonaDefinition::new("a", "A", PersonaCategory::Casual).with_trait("humor", "high", 1.0);
        let b = PersonaDefinition::new("b", "B", PersonaCategory::Technical)
            .with_trait("technical_depth", "deep", 1.0);
        assert_eq!(blend_description(&a, &b, 0.0), "Blend traits: humor=1.00");
        assert_eq!(
            blend_description(&a, &b, 0.75),
            "Blend traits: technical depth=0.75, humor=0.25"
        );
    }
}
