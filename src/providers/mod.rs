// src/providers/mod.rs
//! Provider seams: text -> vector and text -> entity spans.
//!
//! The pipeline treats both as synchronous pure functions. Implementations
//! shipped here are deterministic and model-free; real models plug in by
//! implementing the traits.

pub mod hashing;
pub mod rule_ner;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

pub use hashing::{short_hash, HashingEmbedder};
pub use rule_ner::RuleExtractor;

/// Closed set of entity kinds the impact stage understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Company,
    Sector,
    Regulator,
}

/// A labeled span; offsets are byte offsets into the input text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySpan {
    pub text: String,
    pub kind: EntityKind,
    pub start: usize,
    pub end: usize,
}

impl EntitySpan {
    pub fn new(text: impl Into<String>, kind: EntityKind, start: usize, end: usize) -> Self {
        Self {
            text: text.into(),
            kind,
            start,
            end,
        }
    }
}

pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;
    /// Fixed output dimensionality.
    fn dimension(&self) -> usize;
    /// Deterministic for identical input.
    fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

pub trait EntityExtractor: Send + Sync {
    fn name(&self) -> &str;
    fn extract_entities(&self, text: &str) -> Result<Vec<EntitySpan>, ProviderError>;
}

/// Stand-in for an external NER model that recognizes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullExtractor;

impl EntityExtractor for NullExtractor {
    fn name(&self) -> &str {
        "null"
    }

    fn extract_entities(&self, _text: &str) -> Result<Vec<EntitySpan>, ProviderError> {
        Ok(Vec::new())
    }
}

/// Embed with the contract checks the pipeline relies on:
/// blank text is rejected without calling the provider, and a vector of the
/// wrong dimensionality or with non-finite components is a provider fault.
pub fn checked_embed(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, ProviderError> {
    if text.trim().is_empty() {
        return Err(ProviderError::Rejected {
            provider: embedder.name().to_string(),
            reason: "empty text".into(),
        });
    }
    let v = embedder.embed(text)?;
    if v.len() != embedder.dimension() {
        return Err(ProviderError::Unavailable {
            provider: embedder.name().to_string(),
            message: format!(
                "returned {} dimensions, expected {}",
                v.len(),
                embedder.dimension()
            ),
        });
    }
    if v.iter().any(|x| !x.is_finite()) {
        return Err(ProviderError::Unavailable {
            provider: embedder.name().to_string(),
            message: "returned non-finite components".into(),
        });
    }
    Ok(v)
}
