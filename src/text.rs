// src/text.rs
//! Text primitives: tokenizer, stopwords, lexical overlap and vector similarity.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeSet;
use strsim::normalized_levenshtein;

static RE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?u)\b\w+\b").expect("word regex"));

/// A single token with byte span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

/// Basic, Unicode-friendly tokenizer.
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    RE_WORD
        .find_iter(input)
        .map(|m| Token {
            text: m.as_str(),
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "in", "into",
    "is", "it", "its", "of", "on", "or", "over", "said", "says", "than", "that", "the", "this",
    "to", "was", "were", "will", "with",
];

pub fn is_stopword(w: &str) -> bool {
    STOPWORDS.binary_search(&w).is_ok()
}

/// Lowercased content words (stopwords dropped), in order.
pub fn content_words(input: &str) -> Vec<String> {
    tokenize(input)
        .into_iter()
        .map(|t| t.text.to_lowercase())
        .filter(|w| !is_stopword(w))
        .collect()
}

/// Distinct lowercased content words.
pub fn token_set(input: &str) -> BTreeSet<String> {
    content_words(input).into_iter().collect()
}

/// Lowercase + condensed whitespace, for phrase comparisons.
pub fn normalize_phrase(input: &str) -> String {
    input
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// How headline overlap is measured during deduplication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LexicalMetric {
    /// Jaccard index over distinct content words.
    #[default]
    TokenJaccard,
    /// Normalized Levenshtein over normalized headlines.
    Levenshtein,
}

impl LexicalMetric {
    pub fn overlap(self, a: &str, b: &str) -> f32 {
        match self {
            LexicalMetric::TokenJaccard => jaccard(&token_set(a), &token_set(b)),
            LexicalMetric::Levenshtein => {
                let (na, nb) = (normalize_phrase(a), normalize_phrase(b));
                if na.is_empty() || nb.is_empty() {
                    return 0.0;
                }
                normalized_levenshtein(&na, &nb) as f32
            }
        }
    }
}

/// |A ∩ B| / |A ∪ B|; 0.0 when both are empty.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

/// Cosine similarity. Returns 0.0 for zero-magnitude or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    (dot / (mag_a * mag_b)).clamp(-1.0, 1.0)
}

/// Element-wise mean; `None` for an empty input or mixed dimensions.
pub fn mean_vector(vectors: &[&[f32]]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dim = first.len();
    if vectors.iter().any(|v| v.len() != dim) {
        return None;
    }
    let mut out = vec![0.0f32; dim];
    for v in vectors {
        for (o, x) in out.iter_mut().zip(v.iter()) {
            *o += x;
        }
    }
    let n = vectors.len() as f32;
    out.iter_mut().for_each(|o| *o /= n);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopwords_are_sorted_for_binary_search() {
        let mut sorted = STOPWORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOPWORDS);
    }

    #[test]
    fn tokenizer_basic() {
        let toks = tokenize("RBI holds repo-rate at 6.5%");
        let words: Vec<_> = toks.iter().map(|t| t.text).collect();
        assert_eq!(words, vec!["RBI", "holds", "repo", "rate", "at", "6", "5"]);
        assert_eq!(toks[0].start, 0);
        assert_eq!(toks[0].end, 3);
    }

    #[test]
    fn jaccard_on_headlines() {
        let a = "HDFC Bank declares dividend";
        let b = "HDFC Bank declares interim dividend";
        let j = LexicalMetric::TokenJaccard.overlap(a, b);
        assert!((j - 0.8).abs() < 1e-6, "got {j}");
        assert_eq!(LexicalMetric::TokenJaccard.overlap("", ""), 0.0);
    }

    #[test]
    fn levenshtein_is_case_and_space_insensitive() {
        let s = LexicalMetric::Levenshtein.overlap("Infosys  Q4 results", "infosys q4 results");
        assert!((s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mean_of_two() {
        let m = mean_vector(&[&[1.0, 0.0], &[0.0, 1.0]]).unwrap();
        assert_eq!(m, vec![0.5, 0.5]);
        assert!(mean_vector(&[]).is_none());
    }
}
