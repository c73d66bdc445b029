//! # External collaborators
//!
//! The switching engine reads personas, renders prompts and optionally reads
//! thread metadata through three async traits. Nothing here is owned by the
//! engine: the embedding application supplies real implementations, and
//! [`memory`] provides in-memory ones for tests and the `replay` binary.
//!
//! ```text
//! ContextAwareSwitchingService
//!   │
//!   ├── PersonaStore    find_one / find_all      (read-only)
//!   ├── PromptInjector  inject                   (opaque, possibly slow)
//!   └── ThreadStore     thread_metadata          (optional enrichment)
//! ```
//!
//! Failures are ordinary `Err` values: a missing persona is a
//! [`LookupError`], anything else a [`DependencyError`].

pub mod catalog;
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Message, PersonaDefinition};
use crate::utilities::errors::{DependencyError, LookupError};

pub use catalog::builtin_personas;
pub use memory::{InMemoryPersonaStore, InMemoryThreadStore, TemplatePromptInjector};

/// Read-only persona lookup.
#[async_trait]
pub trait PersonaStore: Send + Sync {
    /// Fetch one persona by id.
    async fn find_one(&self, id: &str) -> Result<PersonaDefinition, LookupError>;

    /// Fetch every persona the store knows about.
    async fn find_all(&self) -> Result<Vec<PersonaDefinition>, LookupError>;
}

/// Input to [`PromptInjector::inject`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InjectionRequest {
    pub original_prompt: String,
    pub persona_id: String,
    /// Values for `{variable}` placeholders in persona templates.
    #[serde(default)]
    pub context_variables: HashMap<String, Value>,
    #[serde(default)]
    pub history: Option<Vec<Message>>,
}

/// Output of [`PromptInjector::inject`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectionResult {
    pub enhanced_prompt: String,
    pub persona_id: String,
    /// Placeholders the injector could not fill.
    #[serde(default)]
    pub missing_variables: Vec<String>,
}

/// Builds a persona-conditioned prompt.
#[async_trait]
pub trait PromptInjector: Send + Sync {
    async fn inject(&self, request: InjectionRequest) -> Result<InjectionResult, DependencyError>;
}

/// Coarse thread metadata used to enrich recommendations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadMetadata {
    pub message_count: usize,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Optional thread/conversation metadata source.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// `Ok(None)` when the thread is unknown.
    async fn thread_metadata(&self, thread_id: &str) -> Result<Option<ThreadMetadata>, DependencyError>;
}
