// src/providers/hashing.rs
//! Feature-hashing embedder: unigrams + bigrams of content words, hashed into
//! a fixed number of signed buckets and L2-normalized.
//!
//! Not a semantic model. It is deterministic across runs and platforms, which
//! is what clustering and ranking need from a default provider.

use sha2::{Digest, Sha256};
use std::fmt::Write as _;

use super::Embedder;
use crate::error::ProviderError;
use crate::text::content_words;

const UNIGRAM_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;

/// First 12 hex chars of SHA-256 over `parts`, each terminated by a NUL byte.
pub fn short_hash<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    digest.iter().take(6).fold(String::with_capacity(12), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&digest[..8]);
        let h = u64::from_le_bytes(raw);
        let idx = (h % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (idx, sign)
    }
}

impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let words = content_words(text);
        if words.is_empty() {
            return Err(ProviderError::Rejected {
                provider: self.name().to_string(),
                reason: "no content words".into(),
            });
        }

        let mut v = vec![0.0f32; self.dimension];
        for w in &words {
            let (i, s) = self.bucket(w);
            v[i] += s * UNIGRAM_WEIGHT;
        }
        for pair in words.windows(2) {
            let (i, s) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            v[i] += s * BIGRAM_WEIGHT;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            // Every feature cancelled out; rare but possible with signed buckets.
            return Err(ProviderError::Rejected {
                provider: self.name().to_string(),
                reason: "degenerate feature vector".into(),
            });
        }
        v.iter_mut().for_each(|x| *x /= norm);
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::cosine_similarity;

    #[test]
    fn deterministic_and_normalized() {
        let e = HashingEmbedder::new(64);
        let a = e.embed("HDFC Bank declares dividend").unwrap();
        let b = e.embed("HDFC Bank declares dividend").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_words_score_higher_than_unrelated() {
        let e = HashingEmbedder::new(256);
        let q = e.embed("HDFC Bank news").unwrap();
        let hdfc = e.embed("HDFC Bank declares dividend for shareholders").unwrap();
        let infy = e.embed("Infosys Q4 results beat estimates").unwrap();
        assert!(cosine_similarity(&q, &hdfc) > cosine_similarity(&q, &infy));
    }

    #[test]
    fn short_hash_is_twelve_hex_and_boundary_sensitive() {
        let h = short_hash(["Mint", "Wipro"]);
        assert_eq!(h.len(), 12);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(h, short_hash(["Mint", "Wipro"]));
        assert_ne!(short_hash(["ab", "c"]), short_hash(["a", "bc"]));
    }

    #[test]
    fn stopword_only_text_is_rejected() {
        let e = HashingEmbedder::new(16);
        assert!(e.embed("the of and").unwrap_err().is_input_rejection());
    }
}
