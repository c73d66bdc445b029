//! Conversation and persona data shared by every component.

pub mod persona;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use persona::{
    trait_distance, ExampleExchange, PersonaCategory, PersonaDefinition, PersonaTrait,
    PromptTemplate, TemplateType,
};

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// One conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    /// Create a message without a timestamp.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
        }
    }

    /// A user-authored message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// An assistant-authored message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Builder: stamp the message.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Whether the user wrote this message.
    pub fn is_user(&self) -> bool {
        self.role == MessageRole::User
    }
}

// ---------------------------------------------------------------------------
// Conversation context
// ---------------------------------------------------------------------------

/// Model parameters a thread was configured with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f64>,
}

/// Optional per-thread hints supplied by the embedding application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub model_parameters: Option<ModelParameters>,
    /// Declared conversation topic.
    #[serde(default)]
    pub topic: Option<String>,
    /// Declared priority ("low", "normal", "high", ...).
    #[serde(default)]
    pub priority: Option<String>,
    /// Session flags such as `"first_session"`.
    #[serde(default)]
    pub flags: HashMap<String, bool>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl ConversationContext {
    /// Context bound to a thread.
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Self::default()
        }
    }

    /// Builder: declare a topic.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Whether a session flag is set.
    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }
}
