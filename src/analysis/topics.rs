//! Topic extraction: sentence-aware chunking followed by tf-idf across chunks.

use std::collections::{BTreeMap, HashMap};

use crate::utilities::string_utils::{content_terms, split_sentences};

use super::types::TopicInfo;

/// Target chunk size in characters.
pub const CHUNK_SIZE: usize = 500;
/// Characters carried over from the end of one chunk into the next.
pub const CHUNK_OVERLAP: usize = 50;
/// Minimum tf-idf score for a term to count as a topic.
pub const MIN_TFIDF: f64 = 0.1;
/// Maximum topics returned.
pub const MAX_TOPICS: usize = 10;

/// Split text into chunks of roughly `size` characters, breaking only at
/// sentence or paragraph boundaries. Each new chunk starts with up to
/// `overlap` trailing characters of the previous one, cut at a word boundary.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        for sentence in split_sentences(paragraph) {
            if !current.is_empty() && current.len() + sentence.len() + 1 > size {
                let carry = overlap_tail(&current, overlap);
                chunks.push(std::mem::take(&mut current));
                current = carry;
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&sentence);
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}

fn overlap_tail(chunk: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    let chars: Vec<char> = chunk.chars().collect();
    let start = chars.len().saturating_sub(overlap);
    let tail: String = chars[start..].iter().collect();
    if start == 0 {
        return tail;
    }
    // Drop the partial word at the front of the tail.
    match tail.find(char::is_whitespace) {
        Some(idx) => tail[idx..].trim().to_string(),
        None => String::new(),
    }
}

/// Rank topic terms by tf-idf across the chunks of `text`.
///
/// `tf` is the raw term count in a chunk and `idf = 1 + ln(N / (1 + df))`.
/// A term's score is its best score over all chunks. Falls back to a single
/// `"general"` topic when nothing qualifies.
pub fn extract_topics(text: &str) -> Vec<TopicInfo> {
    let chunks = chunk_text(text, CHUNK_SIZE, CHUNK_OVERLAP);
    let chunk_terms: Vec<Vec<String>> = chunks.iter().map(|c| content_terms(c)).collect();
    let n = chunk_terms.len() as f64;

    let mut df: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<BTreeMap<&str, usize>> = Vec::with_capacity(chunk_terms.len());
    for terms in &chunk_terms {
        let mut tf: BTreeMap<&str, usize> = BTreeMap::new();
        for term in terms {
            *tf.entry(term.as_str()).or_insert(0) += 1;
        }
        for term in tf.keys() {
            *df.entry(*term).or_insert(0) += 1;
        }
        counts.push(tf);
    }

    // term -> (best score, chunk index of best score)
    let mut best: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    let mut chunk_scores: Vec<Vec<(&str, f64)>> = Vec::with_capacity(counts.len());
    for (idx, tf) in counts.iter().enumerate() {
        let mut scored = Vec::with_capacity(tf.len());
        for (term, count) in tf {
            let idf = 1.0 + (n / (1.0 + df[term] as f64)).ln();
            let score = *count as f64 * idf;
            scored.push((*term, score));
            let entry = best.entry(*term).or_insert((score, idx));
            if score > entry.0 {
                *entry = (score, idx);
            }
        }
        chunk_scores.push(scored);
    }

    let mut ranked: Vec<(&str, f64, usize)> = best
        .into_iter()
        .filter(|(term, (score, _))| *score > MIN_TFIDF && term.chars().count() > 2)
        .map(|(term, (score, idx))| (term, score, idx))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    ranked.truncate(MAX_TOPICS);

    let Some(max_score) = ranked.first().map(|r| r.1) else {
        return vec![general_topic()];
    };

    ranked
        .iter()
        .map(|(term, score, idx)| TopicInfo {
            name: term.to_string(),
            relevance: (score / max_score).clamp(0.0, 1.0),
            keywords: co_occurring(&chunk_scores[*idx], term, 3),
        })
        .collect()
}

fn co_occurring(scored: &[(&str, f64)], term: &str, n: usize) -> Vec<String> {
    let mut others: Vec<&(&str, f64)> = scored.iter().filter(|(t, _)| *t != term).collect();
    others.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    others.into_iter().take(n).map(|(t, _)| t.to_string()).collect()
}

/// The fallback topic.
pub fn general_topic() -> TopicInfo {
    TopicInfo {
        name: "general".to_string(),
        relevance: 0.5,
        keywords: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = chunk_text("One sentence. Another one.", 500, 50);
        assert_eq!(chunks, vec!["One sentence. Another one."]);
    }

    #[test]
    fn test_long_text_splits_at_sentences_with_overlap() {
        let sentence = "The quick brown fox jumps over the lazy dog again and again.";
        let text = vec![sentence; 20].join(" ");
        let chunks = chunk_text(&text, 200, 50);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            // A chunk may exceed the target by at most the overlap carry.
            assert!(chunk.len() <= 200 + 50, "chunk too long: {}", chunk.len());
        }
        // Second chunk starts with words carried over from the first.
        let carried: String = chunks[1].split_whitespace().take(2).collect::<Vec<_>>().join(" ");
        assert!(chunks[0].contains(&carried));
    }

    #[test]
    fn test_extract_topics_ranks_repeated_terms_first() {
        let text = "The algorithm uses a cache. The algorithm is distributed. Algorithm tuning matters.";
        let topics = extract_topics(text);
        assert_eq!(topics[0].name, "algorithm");
        assert_eq!(topics[0].relevance, 1.0);
        assert!(topics.len() <= MAX_TOPICS);
        assert!(topics.iter().all(|t| (0.0..=1.0).contains(&t.relevance)));
    }

    #[test]
    fn test_extract_topics_fallback() {
        let topics = extract_topics("hi, how are you?");
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].name, "general");
    }

    #[test]
    fn test_extract_topics_is_deterministic() {
        let text = "Rust ownership and borrowing. Lifetimes and traits. Ownership again.";
        assert_eq!(extract_topics(text), extract_topics(text));
    }
}
