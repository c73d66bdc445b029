//! Text helpers shared by the analyzer, smoother and state tracker.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

static WORD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9][A-Za-z0-9'_-]*").unwrap());
static SENTENCE_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+(\s+|$)|\n+").unwrap());

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "are", "but", "not", "you", "your", "all", "any", "can", "had",
        "her", "was", "one", "our", "out", "has", "have", "him", "his", "how", "its", "let",
        "may", "who", "did", "get", "got", "this", "that", "with", "from", "they", "them",
        "then", "than", "there", "their", "what", "when", "where", "which", "while", "will",
        "would", "could", "should", "about", "into", "also", "just", "like", "some", "such",
        "very", "been", "being", "were", "does", "doing", "each", "more", "most", "other",
        "over", "only", "own", "same", "too", "here", "these", "those", "why", "because",
        "want", "need", "please", "tell", "give", "know", "think", "really", "much", "well",
        "yes", "yeah", "okay", "thing", "things", "make", "made", "use", "using",
    ]
    .into_iter()
    .collect()
});

/// Lowercased word tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    WORD_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Word tokens longer than two characters that are not stopwords.
pub fn content_terms(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| t.chars().count() > 2 && !is_stopword(t))
        .collect()
}

/// Whether a lowercased token is a stopword.
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

/// Split text into trimmed, non-empty sentences.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_BOUNDARY.find_iter(text) {
        let sentence = text[start..m.end()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        start = m.end();
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

/// Truncate to at most `max_chars` characters, appending an ellipsis if cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

/// Clamp a score into `[0, 1]`, mapping non-finite values to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_keeps_contractions() {
        assert_eq!(
            tokenize("Don't PANIC, it's fine!"),
            vec!["don't", "panic", "it's", "fine"]
        );
    }

    #[test]
    fn test_content_terms_drop_short_and_stopwords() {
        let terms = content_terms("The algorithm is on the GPU and it works");
        assert_eq!(terms, vec!["algorithm", "gpu", "works"]);
    }

    #[test]
    fn test_split_sentences() {
        let s = split_sentences("Hi there! How are you?\nGreat. Tell me a joke");
        assert_eq!(s, vec!["Hi there!", "How are you?", "Great.", "Tell me a joke"]);
    }

    #[test]
    fn test_split_sentences_keeps_decimals_together_when_no_space() {
        let s = split_sentences("Version 2.5 shipped. Done");
        assert_eq!(s, vec!["Version 2.5 shipped.", "Done"]);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("a longer sentence", 8), "a longer...");
    }

    #[test]
    fn test_clamp_unit() {
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(0.42), 0.42);
    }
}
