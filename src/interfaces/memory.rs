//! In-memory collaborator implementations.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;

use super::{
    InjectionRequest, InjectionResult, PersonaStore, PromptInjector, ThreadMetadata, ThreadStore,
};
use crate::types::{PersonaDefinition, TemplateType};
use crate::utilities::errors::{DependencyError, LookupError};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

// ---------------------------------------------------------------------------
// Persona store
// ---------------------------------------------------------------------------

/// Persona store backed by a map.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPersonaStore {
    personas: Arc<RwLock<HashMap<String, PersonaDefinition>>>,
}

impl InMemoryPersonaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `personas`.
    pub fn with_personas(personas: impl IntoIterator<Item = PersonaDefinition>) -> Self {
        let store = Self::new();
        for persona in personas {
            store.insert(persona);
        }
        store
    }

    /// Parse a YAML list of persona definitions.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let personas: Vec<PersonaDefinition> = serde_yaml::from_str(yaml)?;
        Ok(Self::with_personas(personas))
    }

    /// Load a YAML list of persona definitions from disk.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let store = Self::from_yaml_str(&raw)?;
        log::info!("Loaded {} personas from {}", store.len(), path.display());
        Ok(store)
    }

    /// Insert or replace a persona, returning the previous definition.
    pub fn insert(&self, persona: PersonaDefinition) -> Option<PersonaDefinition> {
        self.personas.write().insert(persona.id.clone(), persona)
    }

    pub fn remove(&self, id: &str) -> Option<PersonaDefinition> {
        self.personas.write().remove(id)
    }

    pub fn len(&self) -> usize {
        self.personas.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.read().is_empty()
    }
}

#[async_trait]
impl PersonaStore for InMemoryPersonaStore {
    async fn find_one(&self, id: &str) -> Result<PersonaDefinition, LookupError> {
        self.personas
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| LookupError::not_found(id))
    }

    async fn find_all(&self) -> Result<Vec<PersonaDefinition>, LookupError> {
        let mut all: Vec<PersonaDefinition> = self.personas.read().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

// ---------------------------------------------------------------------------
// Prompt injector
// ---------------------------------------------------------------------------

/// Prepends the persona's highest-priority system template to the prompt.
///
/// `{variable}` placeholders are filled from the request's context variables;
/// unfilled placeholders are left in place and reported as missing. Personas
/// without a system template get a one-line identity preamble.
#[derive(Clone)]
pub struct TemplatePromptInjector {
    store: Arc<dyn PersonaStore>,
}

impl TemplatePromptInjector {
    pub fn new(store: Arc<dyn PersonaStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PromptInjector for TemplatePromptInjector {
    async fn inject(&self, request: InjectionRequest) -> Result<InjectionResult, DependencyError> {
        let persona = self
            .store
            .find_one(&request.persona_id)
            .await
            .map_err(|e| DependencyError::Injection {
                message: e.to_string(),
            })?;

        let (preamble, missing_variables) = match persona.primary_template(TemplateType::System) {
            Some(template) => render_template(&template.template, &request.context_variables),
            None => {
                let mut line = format!("You are {}.", persona.name);
                if !persona.description.is_empty() {
                    line.push(' ');
                    line.push_str(&persona.description);
                }
                (line, Vec::new())
            }
        };

        let enhanced_prompt = if request.original_prompt.trim().is_empty() {
            preamble
        } else {
            format!("{}\n\n{}", preamble, request.original_prompt)
        };

        Ok(InjectionResult {
            enhanced_prompt,
            persona_id: persona.id,
            missing_variables,
        })
    }
}

/// Substitute `{name}` placeholders, returning the text and unfilled names.
pub fn render_template(template: &str, variables: &HashMap<String, Value>) -> (String, Vec<String>) {
    let mut missing = Vec::new();
    let rendered = PLACEHOLDER.replace_all(template, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match variables.get(name) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
                caps[0].to_string()
            }
        }
    });
    (rendered.into_owned(), missing)
}

// ---------------------------------------------------------------------------
// Thread store
// ---------------------------------------------------------------------------

/// Thread metadata backed by a map.
#[derive(Debug, Default, Clone)]
pub struct InMemoryThreadStore {
    threads: Arc<RwLock<HashMap<String, ThreadMetadata>>>,
}

impl InMemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, thread_id: impl Into<String>, metadata: ThreadMetadata) {
        self.threads.write().insert(thread_id.into(), metadata);
    }

    pub fn remove(&self, thread_id: &str) -> Option<ThreadMetadata> {
        self.threads.write().remove(thread_id)
    }
}

#[async_trait]
impl ThreadStore for InMemoryThreadStore {
    async fn thread_metadata(&self, thread_id: &str) -> Result<Option<ThreadMetadata>, DependencyError> {
        Ok(self.threads.read().get(thread_id).cloned())
    }
}
