//! # persona-switch
//!
//! Context-aware persona switching engine.
//!
//! Given a conversation, the engine works out what kind of conversation it
//! is, scores how well each persona fits, decides under a per-thread policy
//! whether to switch, smooths the handover between personas, and keeps a
//! bounded history of persona state per thread.
//!
//! ```text
//!                 ContextAwareSwitchingService (service)
//!                 │          │            │            │
//!    ContextAnalyzer   SwitchingOrchestrator   TransitionSmoother   StateTracker
//!       (analysis)      (switching) ─▶ CompatibilityScorer (scoring)   (state)
//!                 │
//!     PersonaStore · PromptInjector · ThreadStore  (interfaces)
//! ```
//!
//! Persona storage, prompt rendering and thread metadata are collaborators
//! behind async traits in [`interfaces`]; in-memory implementations and a
//! small built-in persona catalog ship with the crate.

pub mod analysis;
pub mod hooks;
pub mod interfaces;
pub mod scoring;
pub mod service;
pub mod state;
pub mod switching;
pub mod transition;
pub mod types;
pub mod utilities;

pub use analysis::{ContextAnalysisResult, ContextAnalyzer};
pub use hooks::{HookRegistry, PipelineHook, PipelineStage, TracingHook};
pub use interfaces::{
    builtin_personas, InMemoryPersonaStore, InMemoryThreadStore, PersonaStore, PromptInjector,
    TemplatePromptInjector, ThreadStore,
};
pub use scoring::{CompatibilityScore, CompatibilityScorer};
pub use service::{ContextAwareSwitchingService, TurnRequest, TurnResult};
pub use state::{StateSnapshot, StateTracker};
pub use switching::{AdaptationResult, SwitchingConfig, SwitchingDecision, SwitchingOrchestrator};
pub use transition::{SmoothTransition, TransitionConfig, TransitionSmoother};
pub use types::{ConversationContext, Message, PersonaDefinition};
pub use utilities::errors::{ConfigError, DependencyError, LookupError, SwitchError};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
