//! Keyword and lexicon tables driving the context analyzer.
//!
//! Tables are plain serde data so they can be tuned from YAML without touching
//! the analyzer. [`AnalyzerLexicon::compile`] turns each keyword list into a
//! single case-insensitive whole-word regex.

use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::types::{CommunicationStyle, ConversationIntent};

// ---------------------------------------------------------------------------
// Serializable tables
// ---------------------------------------------------------------------------

/// Keywords for one intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentKeywords {
    pub intent: ConversationIntent,
    pub keywords: Vec<String>,
}

/// Keywords for one communication style.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleKeywords {
    pub style: CommunicationStyle,
    pub keywords: Vec<String>,
}

/// A named keyword list (emotions, interaction preferences).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedKeywords {
    pub name: String,
    pub keywords: Vec<String>,
}

/// Every table the analyzer consults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerLexicon {
    pub intents: Vec<IntentKeywords>,
    pub technical_terms: Vec<String>,
    pub positive_words: Vec<String>,
    pub negative_words: Vec<String>,
    pub emotions: Vec<NamedKeywords>,
    pub communication_styles: Vec<StyleKeywords>,
    pub expert_markers: Vec<String>,
    pub beginner_markers: Vec<String>,
    pub interaction_preferences: Vec<NamedKeywords>,
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn named(name: &str, list: &[&str]) -> NamedKeywords {
    NamedKeywords {
        name: name.to_string(),
        keywords: words(list),
    }
}

impl Default for AnalyzerLexicon {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AnalyzerLexicon {
    /// The built-in English tables.
    pub fn builtin() -> Self {
        use ConversationIntent as I;

        let intent = |intent, list: &[&str]| IntentKeywords {
            intent,
            keywords: words(list),
        };
        let style = |style, list: &[&str]| StyleKeywords {
            style,
            keywords: words(list),
        };

        Self {
            intents: vec![
                intent(I::InformationSeeking, &[
                    "what", "who", "where", "when", "which", "how", "tell me", "information",
                    "find out", "look up", "details about", "facts",
                ]),
                intent(I::ProblemSolving, &[
                    "solve", "solution", "problem", "fix", "workaround", "figure out",
                    "resolve", "stuck", "doesn't work", "not working", "help me with",
                ]),
                intent(I::CreativeWriting, &[
                    "write", "story", "poem", "creative", "character", "plot", "lyrics",
                    "novel", "fiction", "imagine", "narrative", "script",
                ]),
                intent(I::TechnicalSupport, &[
                    "technical", "implementation", "implement", "code", "programming", "bug",
                    "error", "debug", "install", "configure", "deploy", "compile", "crash",
                    "api", "server", "database", "stack trace", "exception", "troubleshoot",
                ]),
                intent(I::CasualConversation, &[
                    "hi", "hello", "hey", "how are you", "what's up", "great", "cool",
                    "nice", "lol", "haha", "good morning", "good evening", "chat", "weekend",
                ]),
                intent(I::Learning, &[
                    "learn", "explain", "understand", "teach", "tutorial", "lesson",
                    "concept", "study", "course", "beginner", "how does", "what is",
                ]),
                intent(I::Analysis, &[
                    "analyze", "analyse", "analysis", "compare", "comparison", "evaluate",
                    "assess", "metrics", "statistics", "data", "trend", "tradeoff",
                    "tradeoffs", "trade-off", "pros and cons", "benchmark",
                ]),
                intent(I::DecisionMaking, &[
                    "decide", "decision", "choose", "choice", "should i", "which one",
                    "option", "options", "recommend", "alternative", "better",
                ]),
                intent(I::EmotionalSupport, &[
                    "feel", "feeling", "sad", "lonely", "anxious", "depressed", "stressed",
                    "overwhelmed", "upset", "worried", "hurt", "support", "cope",
                ]),
                intent(I::Entertainment, &[
                    "joke", "funny", "fun", "game", "play", "riddle", "movie", "music",
                    "entertain", "bored", "laugh", "trivia",
                ]),
                intent(I::Planning, &[
                    "plan", "schedule", "roadmap", "timeline", "organize", "goal", "goals",
                    "milestone", "agenda", "prepare", "strategy", "next steps",
                ]),
                intent(I::Feedback, &[
                    "feedback", "review", "critique", "opinion", "thoughts on", "rate",
                    "improve", "suggestions", "what do you think",
                ]),
            ],
            technical_terms: words(&[
                "algorithm", "algorithms", "implementation", "architecture", "api", "apis",
                "database", "function", "framework", "protocol", "latency", "concurrency",
                "asynchronous", "async", "compiler", "kubernetes", "microservice",
                "microservices", "distributed", "consensus", "encryption", "cache", "thread",
                "threads", "runtime", "deployment", "schema", "query", "optimization",
                "scalability", "backend", "frontend", "infrastructure", "recursion",
                "data structure", "complexity", "pipeline", "interface", "endpoint",
                "repository", "memory", "server", "network", "throughput", "refactor",
            ]),
            positive_words: words(&[
                "good", "great", "happy", "love", "excellent", "awesome", "wonderful",
                "thanks", "thank", "amazing", "glad", "nice", "fantastic", "perfect",
                "enjoy", "excited", "helpful", "brilliant", "pleased", "delighted",
            ]),
            negative_words: words(&[
                "bad", "terrible", "hate", "awful", "sad", "angry", "frustrated",
                "annoyed", "upset", "worried", "disappointed", "horrible", "confused",
                "stuck", "wrong", "broken", "fail", "failed", "problem", "anxious",
                "stressed", "overwhelmed", "lonely", "hurt",
            ]),
            emotions: vec![
                named("joy", &["happy", "glad", "joy", "delighted", "excited", "thrilled"]),
                named("anger", &["angry", "furious", "mad", "annoyed", "hate", "outraged"]),
                named("sadness", &["sad", "unhappy", "depressed", "lonely", "miserable", "cry"]),
                named("fear", &["afraid", "scared", "worried", "anxious", "nervous", "terrified"]),
                named("surprise", &["surprised", "wow", "unexpected", "shocked", "amazing"]),
                named("frustration", &["frustrated", "stuck", "annoying", "ugh", "fed up", "overwhelmed"]),
                named("confusion", &["confused", "lost", "unclear", "don't understand", "puzzled"]),
                named("gratitude", &["thanks", "thank you", "grateful", "appreciate"]),
            ],
            communication_styles: vec![
                style(CommunicationStyle::Formal, &[
                    "please", "kindly", "regards", "would you", "could you", "thank you",
                    "sincerely", "appreciate", "furthermore", "therefore", "however",
                    "dear", "respectfully",
                ]),
                style(CommunicationStyle::Casual, &[
                    "hey", "hi", "lol", "gonna", "wanna", "cool", "yeah", "yep", "awesome",
                    "btw", "haha", "dude", "stuff", "kinda",
                ]),
                style(CommunicationStyle::Technical, &[
                    "function", "algorithm", "implementation", "api", "database",
                    "architecture", "code", "server", "protocol", "latency", "framework",
                    "compile", "runtime", "query", "deploy",
                ]),
                style(CommunicationStyle::Emotional, &[
                    "feel", "feeling", "love", "hate", "worried", "scared", "excited",
                    "upset", "sad", "happy", "frustrated", "heart",
                ]),
            ],
            expert_markers: words(&[
                "in production", "benchmark", "optimize", "tradeoff", "trade-off",
                "scalability", "concurrency", "latency", "throughput", "refactor",
                "asynchronous", "idempotent", "invariant", "big-o", "profiling",
            ]),
            beginner_markers: words(&[
                "beginner", "new to", "just started", "what is", "don't understand",
                "simple terms", "eli5", "basics", "confused", "first time", "newbie",
            ]),
            interaction_preferences: vec![
                named("examples", &["example", "examples", "for instance", "show me"]),
                named("step_by_step", &["step by step", "steps", "walk me through", "walkthrough"]),
                named("detailed_explanations", &["detailed", "in depth", "in-depth", "thorough", "explanation"]),
                named("quick_answers", &["quick", "quickly", "brief", "short", "tl;dr", "summary"]),
                named("visual_aids", &["diagram", "chart", "visual", "table", "graph"]),
                named("code_samples", &["code", "snippet", "sample code"]),
            ],
        }
    }

    /// Parse a lexicon from YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load a lexicon from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml_str(&raw)?)
    }

    /// Compile every keyword list into a matcher.
    pub fn compile(&self) -> Result<CompiledLexicon, regex::Error> {
        let intents = self
            .intents
            .iter()
            .map(|k| Ok((k.intent, KeywordMatcher::new(&k.keywords)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        let emotions = self
            .emotions
            .iter()
            .map(|k| Ok((k.name.clone(), KeywordMatcher::new(&k.keywords)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        let styles = self
            .communication_styles
            .iter()
            .map(|k| Ok((k.style, KeywordMatcher::new(&k.keywords)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        let preferences = self
            .interaction_preferences
            .iter()
            .map(|k| Ok((k.name.clone(), KeywordMatcher::new(&k.keywords)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(CompiledLexicon {
            intents,
            technical: KeywordMatcher::new(&self.technical_terms)?,
            technical_set: self.technical_terms.iter().map(|t| t.to_lowercase()).collect(),
            positive: KeywordMatcher::new(&self.positive_words)?,
            negative: KeywordMatcher::new(&self.negative_words)?,
            emotions,
            styles,
            expert: KeywordMatcher::new(&self.expert_markers)?,
            beginner: KeywordMatcher::new(&self.beginner_markers)?,
            preferences,
        })
    }
}

// ---------------------------------------------------------------------------
// Compiled form
// ---------------------------------------------------------------------------

/// Case-insensitive whole-word matcher over a keyword list.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    regex: Option<Regex>,
}

impl KeywordMatcher {
    /// Build a matcher. Longer phrases are tried first so that
    /// `"how are you"` wins over `"how"` within one list.
    pub fn new(keywords: &[String]) -> Result<Self, regex::Error> {
        let mut escaped: Vec<String> = keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if escaped.is_empty() {
            return Ok(Self { regex: None });
        }
        escaped.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        escaped.dedup();
        let alternation = escaped
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        let regex = Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))?;
        Ok(Self { regex: Some(regex) })
    }

    /// Number of whole-word hits in `text`.
    pub fn count(&self, text: &str) -> usize {
        self.regex
            .as_ref()
            .map(|r| r.find_iter(text).count())
            .unwrap_or(0)
    }

    /// Whether `text` contains at least one hit.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.as_ref().map(|r| r.is_match(text)).unwrap_or(false)
    }
}

/// A lexicon ready for matching.
#[derive(Debug, Clone)]
pub struct CompiledLexicon {
    pub intents: Vec<(ConversationIntent, KeywordMatcher)>,
    pub technical: KeywordMatcher,
    technical_set: HashSet<String>,
    pub positive: KeywordMatcher,
    pub negative: KeywordMatcher,
    pub emotions: Vec<(String, KeywordMatcher)>,
    pub styles: Vec<(CommunicationStyle, KeywordMatcher)>,
    pub expert: KeywordMatcher,
    pub beginner: KeywordMatcher,
    pub preferences: Vec<(String, KeywordMatcher)>,
}

impl CompiledLexicon {
    /// Whether a single term (or its singular form) is a technical term.
    pub fn is_technical_term(&self, term: &str) -> bool {
        let lower = term.to_lowercase();
        if self.technical_set.contains(&lower) {
            return true;
        }
        lower
            .strip_suffix('s')
            .map(|singular| self.technical_set.contains(singular))
            .unwrap_or(false)
    }
}

/// Compiled built-in lexicon shared by every default analyzer.
pub static DEFAULT_LEXICON: Lazy<std::sync::Arc<CompiledLexicon>> = Lazy::new(|| {
    std::sync::Arc::new(
        AnalyzerLexicon::builtin()
            .compile()
            .expect("built-in lexicon must compile"),
    )
});
