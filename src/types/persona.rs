//! Persona definitions as served by the persona store.
//!
//! These are read-only inside the engine; nothing here mutates a persona.

use serde::{Deserialize, Serialize};

/// Broad persona category, used by the compatibility scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaCategory {
    Assistant,
    Technical,
    Analytical,
    Creative,
    Educational,
    Professional,
    Supportive,
    Casual,
    Entertainment,
    Custom,
}

impl PersonaCategory {
    /// Snake-case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assistant => "assistant",
            Self::Technical => "technical",
            Self::Analytical => "analytical",
            Self::Creative => "creative",
            Self::Educational => "educational",
            Self::Professional => "professional",
            Self::Supportive => "supportive",
            Self::Casual => "casual",
            Self::Entertainment => "entertainment",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for PersonaCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, weighted behavioural attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaTrait {
    /// Trait name, e.g. `"formality"`.
    pub name: String,
    /// Free-form value, e.g. `"high"` or `"warm and encouraging"`.
    pub value: String,
    /// Weight in `[0, 1]`.
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Optional longer description.
    #[serde(default)]
    pub description: Option<String>,
}

fn default_weight() -> f64 {
    0.5
}

impl PersonaTrait {
    /// Create a trait with a clamped weight.
    pub fn new(name: impl Into<String>, value: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            weight: weight.clamp(0.0, 1.0),
            description: None,
        }
    }

    /// Builder: attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Which part of a prompt a template renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateType {
    System,
    User,
    Assistant,
    Context,
}

/// A prompt template owned by a persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    #[serde(rename = "type")]
    pub template_type: TemplateType,
    /// Template text with `{variable}` placeholders.
    pub template: String,
    #[serde(default)]
    pub input_variables: Vec<String>,
    /// Higher priority templates are preferred.
    #[serde(default)]
    pub priority: i32,
}

/// An example exchange illustrating the persona's voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleExchange {
    pub user: String,
    pub assistant: String,
}

/// A full persona definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: PersonaCategory,
    /// Ordered, weighted traits.
    #[serde(default)]
    pub traits: Vec<PersonaTrait>,
    /// Ordered prompt templates.
    #[serde(default)]
    pub prompt_templates: Vec<PromptTemplate>,
    #[serde(default)]
    pub examples: Vec<ExampleExchange>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    1
}

impl PersonaDefinition {
    /// Create an active persona with no traits or templates.
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: PersonaCategory) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category,
            traits: Vec::new(),
            prompt_templates: Vec::new(),
            examples: Vec::new(),
            is_active: true,
            is_system: false,
            version: 1,
        }
    }

    /// Builder: set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder: append a trait.
    pub fn with_trait(mut self, name: &str, value: &str, weight: f64) -> Self {
        self.traits.push(PersonaTrait::new(name, value, weight));
        self
    }

    /// Builder: append a prompt template.
    pub fn with_template(mut self, template_type: TemplateType, template: &str, priority: i32) -> Self {
        self.prompt_templates.push(PromptTemplate {
            template_type,
            template: template.to_string(),
            input_variables: Vec::new(),
            priority,
        });
        self
    }

    /// Builder: append an example exchange.
    pub fn with_example(mut self, user: &str, assistant: &str) -> Self {
        self.examples.push(ExampleExchange {
            user: user.to_string(),
            assistant: assistant.to_string(),
        });
        self
    }

    /// Look up a trait by case-insensitive name.
    pub fn trait_named(&self, name: &str) -> Option<&PersonaTrait> {
        self.traits.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Weight of a trait, 0 if absent.
    pub fn trait_weight(&self, name: &str) -> f64 {
        self.trait_named(name).map(|t| t.weight).unwrap_or(0.0)
    }

    /// Traits sorted by descending weight, at most `n`.
    pub fn top_traits(&self, n: usize) -> Vec<&PersonaTrait> {
        let mut traits: Vec<&PersonaTrait> = self.traits.iter().collect();
        traits.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
        traits.truncate(n);
        traits
    }

    /// Highest-priority template of the given type.
    pub fn primary_template(&self, template_type: TemplateType) -> Option<&PromptTemplate> {
        self.prompt_templates
            .iter()
            .filter(|t| t.template_type == template_type)
            .max_by_key(|t| t.priority)
    }
}

/// Mean absolute difference of trait weights over the union of trait names.
///
/// A trait missing on one side counts as weight 0. Returns 0 when neither
/// persona has traits.
pub fn trait_distance(a: &PersonaDefinition, b: &PersonaDefinition) -> f64 {
    let mut names: Vec<String> = a
        .traits
        .iter()
        .chain(b.traits.iter())
        .map(|t| t.name.to_lowercase())
        .collect();
    names.sort();
    names.dedup();

    if names.is_empty() {
        return 0.0;
    }

    let total: f64 = names
        .iter()
        .map(|name| (a.trait_weight(name) - b.trait_weight(name)).abs())
        .sum();
    (total / names.len() as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trait_weight_is_clamped() {
        let t = PersonaTrait::new("formality", "high", 1.4);
        assert_eq!(t.weight, 1.0);
    }

    #[test]
    fn test_top_traits_sorted() {
        let p = PersonaDefinition::new("p", "P", PersonaCategory::Technical)
            .with_trait("a", "x", 0.2)
            .with_trait("b", "x", 0.9)
            .with_trait("c", "x", 0.5);
        let names: Vec<_> = p.top_traits(2).iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn test_trait_distance_identical_is_zero() {
        let p = PersonaDefinition::new("p", "P", PersonaCategory::Casual).with_trait("humor", "high", 0.8);
        assert_eq!(trait_distance(&p, &p.clone()), 0.0);
    }

    #[test]
    fn test_trait_distance_disjoint() {
        let a = PersonaDefinition::new("a", "A", PersonaCategory::Casual).with_trait("humor", "high", 0.8);
        let b = PersonaDefinition::new("b", "B", PersonaCategory::Technical).with_trait("precision", "high", 0.6);
        assert!((trait_distance(&a, &b) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_primary_template_prefers_priority() {
        let p = PersonaDefinition::new("p", "P", PersonaCategory::Assistant)
            .with_template(TemplateType::System, "low", 1)
            .with_template(TemplateType::System, "high", 5)
            .with_template(TemplateType::User, "user", 9);
        assert_eq!(p.primary_template(TemplateType::System).unwrap().template, "high");
    }

    #[test]
    fn test_persona_yaml_defaults() {
        let yaml = r#"
id: helper
name: Helper
category: assistant
traits:
  - name: warmth
    value: high
"#;
        let p: PersonaDefinition = serde_yaml::from_str(yaml).unwrap();
        assert!(p.is_active);
        assert_eq!(p.version, 1);
        assert_eq!(p.traits[0].weight, 0.5);
    }
}
