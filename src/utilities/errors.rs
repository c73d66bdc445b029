//! Error types shared across the switching engine.
//!
//! Every error here is eventually turned into data at the service boundary;
//! see [`crate::service::ContextAwareSwitchingService`].

use thiserror::Error;

/// Errors raised when a persona cannot be resolved.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LookupError {
    /// The persona id is unknown to the store.
    #[error("Persona not found: {persona_id}")]
    PersonaNotFound { persona_id: String },

    /// The store itself failed while answering.
    #[error("Persona store error: {message}")]
    Store { message: String },
}

impl LookupError {
    /// Shorthand for [`LookupError::PersonaNotFound`].
    pub fn not_found(persona_id: impl Into<String>) -> Self {
        Self::PersonaNotFound {
            persona_id: persona_id.into(),
        }
    }
}

/// Errors raised by external collaborators other than the persona store.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DependencyError {
    /// Prompt injection failed.
    #[error("Prompt injection failed: {message}")]
    Injection { message: String },

    /// Thread/conversation store failed.
    #[error("Thread store error: {message}")]
    ThreadStore { message: String },
}

/// Errors raised while applying configuration overrides.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// The override names a key the configuration does not have.
    #[error("Unknown configuration key: {path}")]
    UnknownKey { path: String },

    /// The override value has the wrong shape or type.
    #[error("Invalid value for {path}: {message}")]
    InvalidValue { path: String, message: String },

    /// Overrides must be a JSON object.
    #[error("Configuration overrides must be an object")]
    NotAnObject,
}

/// Umbrella error for fallible engine operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SwitchError {
    /// Persona lookup failed.
    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// A collaborator failed.
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    /// A required argument was malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl SwitchError {
    /// Whether the error originated from a persona lookup.
    pub fn is_lookup(&self) -> bool {
        matches!(self, Self::Lookup(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_error_display() {
        let err = LookupError::not_found("tech-expert");
        assert_eq!(err.to_string(), "Persona not found: tech-expert");
    }

    #[test]
    fn test_switch_error_from_lookup_is_transparent() {
        let err: SwitchError = LookupError::not_found("x").into();
        assert!(err.is_lookup());
        assert_eq!(err.to_string(), "Persona not found: x");
    }

    #[test]
    fn test_dependency_error_is_not_lookup() {
        let err: SwitchError = DependencyError::Injection {
            message: "timeout".into(),
        }
        .into();
        assert!(!err.is_lookup());
        assert!(err.to_string().contains("timeout"));
    }
}
