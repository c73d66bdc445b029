//! Persona recommendations for a thread.
//!
//! Ranking comes from the compatibility scorer; thread-store metadata adds a
//! small boost for category and tag matches. When ranking is impossible the
//! result says so with [`RecommendationStatus::Unavailable`] instead of
//! inventing scores.

use chrono::Utc;

use super::{ContextAwareSwitchingService, PersonaRecommendation, RecommendationSet, RecommendationStatus};
use crate::interfaces::ThreadMetadata;
use crate::scoring::{RankOptions, RankedPersona};
use crate::types::{ConversationContext, Message};
use crate::utilities::string_utils::clamp_unit;

const CATEGORY_BOOST: f64 = 0.1;
const TAG_BOOST: f64 = 0.05;
const MAX_BOOST: f64 = 0.2;

impl ContextAwareSwitchingService {
    /// Up to `limit` personas ranked for the conversation.
    pub async fn recommend_personas(
        &self,
        thread_id: &str,
        messages: &[Message],
        context: Option<&ConversationContext>,
        limit: usize,
    ) -> RecommendationSet {
        if limit == 0 {
            return RecommendationSet::unavailable(thread_id, "limit must be at least 1");
        }

        let analysis = self.analyzer.analyze(messages, context, None).await;
        let ranked = match self
            .scorer
            .rank(
                &analysis,
                None,
                RankOptions {
                    confidence_threshold: 0.0,
                    max_results: usize::MAX,
                },
            )
            .await
        {
            Ok(ranked) => ranked,
            Err(e) => {
                log::warn!("Recommendations unavailable for thread {}: {}", thread_id, e);
                return RecommendationSet::unavailable(thread_id, format!("Persona ranking failed: {}", e));
            }
        };
        if ranked.is_empty() {
            return RecommendationSet::unavailable(thread_id, "No active personas to recommend");
        }

        let metadata = self.thread_metadata(thread_id).await;
        let mut items: Vec<PersonaRecommendation> = ranked
            .into_iter()
            .map(|r| recommendation(r, metadata.as_ref()))
            .collect();
        items.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.persona_id.cmp(&b.persona_id))
        });
        items.truncate(limit);

        RecommendationSet {
            thread_id: thread_id.to_string(),
            status: RecommendationStatus::Ready,
            confidence: items.first().map(|i| i.confidence).unwrap_or(0.0),
            items,
            generated_at: Utc::now(),
        }
    }

    /// Thread metadata if a store is configured and answers.
    async fn thread_metadata(&self, thread_id: &str) -> Option<ThreadMetadata> {
        let store = self.thread_store.as_ref()?;
        match store.thread_metadata(thread_id).await {
            Ok(metadata) => metadata,
            Err(e) => {
                log::warn!("Thread store unavailable for {}: {}", thread_id, e);
                None
            }
        }
    }
}

fn recommendation(ranked: RankedPersona, metadata: Option<&ThreadMetadata>) -> PersonaRecommendation {
    let mut reasons = ranked.score.rationale.strengths.clone();
    let (boost, boost_reasons) = match metadata {
        Some(meta) => metadata_boost(meta, &ranked),
        None => (0.0, Vec::new()),
    };
    reasons.extend(boost_reasons);

    PersonaRecommendation {
        score: clamp_unit(ranked.score.overall + boost),
        confidence: ranked.score.confidence,
        metadata_boost: boost,
        reasons,
        persona_id: ranked.persona_id,
        persona_name: ranked.persona_name,
        category: ranked.category,
    }
}

fn metadata_boost(meta: &ThreadMetadata, ranked: &RankedPersona) -> (f64, Vec<String>) {
    let category = ranked.category.as_str();
    let mut boost = 0.0;
    let mut reasons = Vec::new();

    if meta
        .category
        .as_deref()
        .map(|c| c.eq_ignore_ascii_case(category))
        .unwrap_or(false)
    {
        boost += CATEGORY_BOOST;
        reasons.push(format!("thread category matches {}", category));
    }

    for tag in &meta.tags {
        let tag = tag.to_lowercase();
        let hit = tag == category || ranked.score.rationale.matching_traits.iter().any(|t| *t == tag);
        if hit {
            boost += TAG_BOOST;
            reasons.push(format!("thread tag '{}' matches", tag));
        }
    }

    (boost.min(MAX_BOOST), reasons)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::interfaces::catalog::{EMPATHETIC_SUPPORTER, TECHNICAL_EXPERT};
    use crate::interfaces::{
        builtin_personas, InMemoryPersonaStore, InMemoryThreadStore, PersonaStore, TemplatePromptInjector,
        ThreadStore,
    };
    use crate::service::tests::technical_chat;
    use crate::types::PersonaDefinition;
    use crate::utilities::errors::{DependencyError, LookupError};

    struct BrokenStore;

    #[async_trait]
    impl PersonaStore for BrokenStore {
        async fn find_one(&self, id: &str) -> Result<PersonaDefinition, LookupError> {
            Err(LookupError::not_found(id))
        }

        async fn find_all(&self) -> Result<Vec<PersonaDefinition>, LookupError> {
            Err(LookupError::Store {
                message: "database offline".to_string(),
            })
        }
    }

    struct BrokenThreads;

    #[async_trait]
    impl ThreadStore for BrokenThreads {
        async fn thread_metadata(&self, _thread_id: &str) -> Result<Option<ThreadMetadata>, DependencyError> {
            Err(DependencyError::ThreadStore {
                message: "timeout".to_string(),
            })
        }
    }

    fn service_with(threads: Arc<dyn ThreadStore>) -> ContextAwareSwitchingService {
        let store = Arc::new(InMemoryPersonaStore::with_personas(builtin_personas()));
        let injector = Arc::new(TemplatePromptInjector::new(store.clone()));
        ContextAwareSwitchingService::new(store, injector).with_thread_store(threads)
    }

    #[tokio::test]
    async fn test_recommends_technical_expert_first() {
        let svc = service_with(Arc::new(InMemoryThreadStore::new()));
        let set = svc.recommend_personas("t1", &technical_chat(), None, 3).await;
        assert!(set.is_available());
        assert_eq!(set.items.len(), 3);
        assert_eq!(set.items[0].persona_id, TECHNICAL_EXPERT);
        assert_eq!(set.confidence, set.items[0].confidence);
    }

    #[tokio::test]
    async fn test_thread_metadata_boosts_matching_category() {
        let threads = InMemoryThreadStore::new();
        threads.insert(
            "t1",
            ThreadMetadata {
                message_count: 3,
                category: Some("Supportive".to_string()),
                tags: vec!["supportive".to_string()],
            },
        );
        let svc = service_with(Arc::new(threads));
        let set = svc.recommend_personas("t1", &technical_chat(), None, 10).await;
        let supporter = set
            .items
            .iter()
            .find(|i| i.persona_id == EMPATHETIC_SUPPORTER)
            .unwrap();
        assert!((supporter.metadata_boost - 0.15).abs() < 1e-9);
        assert!(set.items.iter().filter(|i| i.persona_id != EMPATHETIC_SUPPORTER).all(|i| i.metadata_boost == 0.0));
    }

    #[tokio::test]
    async fn test_thread_store_failure_is_not_fatal() {
        let svc = service_with(Arc::new(BrokenThreads));
        let set = svc.recommend_personas("t1", &technical_chat(), None, 2).await;
        assert!(set.is_available());
        assert_eq!(set.items.len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_without_random_fallback() {
        let store = Arc::new(BrokenStore);
        let injector = Arc::new(TemplatePromptInjector::new(store.clone()));
        let svc = ContextAwareSwitchingService::new(store, injector);
        let set = svc.recommend_personas("t1", &technical_chat(), None, 3).await;
        assert!(matches!(set.status, RecommendationStatus::Unavailable { .. }));
        assert!(set.items.is_empty());
        assert_eq!(set.confidence, 0.0);
    }
}
