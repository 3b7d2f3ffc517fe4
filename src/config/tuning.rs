// src/config/tuning.rs
//! Thresholds and weights for clustering and ranking.

use serde::Deserialize;

use crate::error::{CoreError, CoreResult};
use crate::text::LexicalMetric;

pub const DEFAULT_SIM_THRESHOLD: f32 = 0.80;
pub const DEFAULT_LEX_THRESHOLD: f32 = 0.30;
pub const DEFAULT_ENTITY_WEIGHT: f32 = 0.6;
pub const DEFAULT_SEMANTIC_WEIGHT: f32 = 0.4;
pub const DEFAULT_EXCERPT_CHARS: usize = 400;
pub const DEFAULT_EMBEDDING_DIM: usize = 256;

pub const ENV_SIM_THRESHOLD: &str = "NEWS_SIM_THRESHOLD";
pub const ENV_LEX_THRESHOLD: &str = "NEWS_LEX_THRESHOLD";

const WEIGHT_SUM_TOLERANCE: f32 = 1e-6;

fn default_sim_threshold() -> f32 {
    DEFAULT_SIM_THRESHOLD
}
fn default_lex_threshold() -> f32 {
    DEFAULT_LEX_THRESHOLD
}
fn default_entity_weight() -> f32 {
    DEFAULT_ENTITY_WEIGHT
}
fn default_semantic_weight() -> f32 {
    DEFAULT_SEMANTIC_WEIGHT
}
fn default_excerpt_chars() -> usize {
    DEFAULT_EXCERPT_CHARS
}
fn default_embedding_dim() -> usize {
    DEFAULT_EMBEDDING_DIM
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tuning {
    /// Minimum embedding cosine for two articles to be the same story.
    #[serde(default = "default_sim_threshold")]
    pub sim_threshold: f32,
    /// Minimum headline overlap for two articles to be the same story.
    #[serde(default = "default_lex_threshold")]
    pub lex_threshold: f32,
    #[serde(default)]
    pub lexical_metric: LexicalMetric,
    /// Body characters appended to the headline before embedding.
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
    #[serde(default = "default_entity_weight")]
    pub entity_weight: f32,
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    /// Default `min_score` for `GET /query` when the request omits one.
    #[serde(default)]
    pub min_score: f32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            sim_threshold: DEFAULT_SIM_THRESHOLD,
            lex_threshold: DEFAULT_LEX_THRESHOLD,
            lexical_metric: LexicalMetric::default(),
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
            entity_weight: DEFAULT_ENTITY_WEIGHT,
            semantic_weight: DEFAULT_SEMANTIC_WEIGHT,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            min_score: 0.0,
        }
    }
}

impl Tuning {
    pub fn validate(&self) -> CoreResult<()> {
        for (name, v) in [
            ("sim_threshold", self.sim_threshold),
            ("lex_threshold", self.lex_threshold),
            ("entity_weight", self.entity_weight),
            ("semantic_weight", self.semantic_weight),
            ("min_score", self.min_score),
        ] {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(CoreError::config(format!(
                    "tuning.{name} must be within [0, 1], got {v}"
                )));
            }
        }
        let sum = self.entity_weight + self.semantic_weight;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(CoreError::config(format!(
                "tuning.entity_weight + tuning.semantic_weight must equal 1.0, got {sum}"
            )));
        }
        if self.embedding_dim == 0 {
            return Err(CoreError::config("tuning.embedding_dim must be positive"));
        }
        Ok(())
    }

    /// Apply `NEWS_SIM_THRESHOLD` / `NEWS_LEX_THRESHOLD` when set and parseable.
    pub fn apply_env_overrides(&mut self) {
        if let Some(t) = parse_threshold_env(std::env::var(ENV_SIM_THRESHOLD).ok()) {
            self.sim_threshold = t;
        }
        if let Some(t) = parse_threshold_env(std::env::var(ENV_LEX_THRESHOLD).ok()) {
            self.lex_threshold = t;
        }
    }
}

// parse optional float env and clamp to <0.0..=1.0>
fn parse_threshold_env(raw: Option<String>) -> Option<f32> {
    raw.and_then(|s| s.trim().parse::<f32>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let t = Tuning::default();
        assert!(t.validate().is_ok());
        assert_eq!(t.sim_threshold, 0.80);
        assert_eq!(t.lex_threshold, 0.30);
    }

    #[test]
    fn weights_must_sum_to_one() {
        let t = Tuning {
            entity_weight: 0.7,
            semantic_weight: 0.4,
            ..Tuning::default()
        };
        let err = t.validate().unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }

    #[test]
    fn threshold_env_is_clamped() {
        assert_eq!(parse_threshold_env(Some(" 1.7 ".into())), Some(1.0));
        assert_eq!(parse_threshold_env(Some("-2".into())), Some(0.0));
        assert_eq!(parse_threshold_env(Some("abc".into())), None);
        assert_eq!(parse_threshold_env(Some("NaN".into())), None);
        assert_eq!(parse_threshold_env(None), None);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let t: Tuning = toml::from_str("sim_threshold = 0.9\nlexical_metric = \"levenshtein\"")
            .expect("parse tuning");
        assert_eq!(t.sim_threshold, 0.9);
        assert_eq!(t.lexical_metric, LexicalMetric::Levenshtein);
        assert_eq!(t.entity_weight, DEFAULT_ENTITY_WEIGHT);
    }
}
