// src/query.rs
//! Query engine: classify the query, restrict candidates, fuse entity and
//! semantic signals, rank.
//!
//! score = entity_weight * entity_signal + semantic_weight * semantic
//!
//! `semantic` is the cosine between the query embedding and the story's
//! canonical embedding, floored at 0. The canonical embedding is the vector
//! computed during clustering for the canonical article: its headline plus
//! the first `excerpt_chars` body characters, i.e. a prefix of
//! `Story::canonical_text()`. A query the provider refuses to embed ranks on
//! the entity signal alone.
//!
//! `query` and `query_with` apply only the `min_score` passed in;
//! `Tuning::min_score` is the HTTP layer's default.

use metrics::{counter, histogram};
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::{NewsConfig, RuleTables};
use crate::error::{CoreError, CoreResult};
use crate::model::{ImpactedStock, StoryWithImpact};
use crate::providers::{checked_embed, short_hash, Embedder};
use crate::text::cosine_similarity;

pub const MAX_QUERY_CHARS: usize = 1024;
pub const DEFAULT_TOP_K: usize = 5;

const ENV_DEV_LOG: &str = "NEWS_DEV_LOG";

// Dev logging gate: NEWS_DEV_LOG=1 AND dev env (debug or SHUTTLE_ENV in {local,development,dev})
pub(crate) fn dev_logging_enabled() -> bool {
    let on = std::env::var(ENV_DEV_LOG).ok().as_deref() == Some("1");
    if !on {
        return false;
    }
    if cfg!(debug_assertions) {
        return true;
    }
    matches!(
        std::env::var("SHUTTLE_ENV")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str(),
        "local" | "development" | "dev"
    )
}

/// Short stable fingerprint of user text for logs.
pub(crate) fn anon_hash(text: &str) -> String {
    short_hash([text])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryKind {
    Entity { ticker: String },
    Sector { sector: String },
    Regulator { regulator: String },
    Thematic,
}

impl QueryKind {
    pub fn label(&self) -> &'static str {
        match self {
            QueryKind::Entity { .. } => "entity",
            QueryKind::Sector { .. } => "sector",
            QueryKind::Regulator { .. } => "regulator",
            QueryKind::Thematic => "thematic",
        }
    }

    /// The stock that qualifies a story for this query, if any.
    /// Thematic queries accept every story without one.
    fn matched_stock<'a>(&self, s: &'a StoryWithImpact) -> Option<&'a ImpactedStock> {
        match self {
            QueryKind::Entity { ticker } => s.stock(ticker),
            QueryKind::Sector { sector } => strongest(s, |st| st.references_sector(sector)),
            QueryKind::Regulator { regulator } => {
                strongest(s, |st| st.references_regulator(regulator))
            }
            QueryKind::Thematic => None,
        }
    }
}

/// Highest-confidence stock passing `pred`; ties go to the first ticker.
fn strongest<'a>(
    s: &'a StoryWithImpact,
    pred: impl Fn(&ImpactedStock) -> bool,
) -> Option<&'a ImpactedStock> {
    s.impacted.iter().filter(|st| pred(st)).max_by(|a, b| {
        a.confidence
            .total_cmp(&b.confidence)
            .then_with(|| b.ticker.cmp(&a.ticker))
    })
}

/// Whole-query, case-insensitive match: ticker/alias, then sector, then regulator.
pub fn classify(text: &str, tables: &RuleTables) -> QueryKind {
    let q = text.trim();
    if q.is_empty() {
        return QueryKind::Thematic;
    }
    if let Some(ticker) = tables.resolve_company(q) {
        return QueryKind::Entity {
            ticker: ticker.to_string(),
        };
    }
    if let Some(sector) = tables.resolve_sector(q) {
        return QueryKind::Sector {
            sector: sector.to_string(),
        };
    }
    if let Some(regulator) = tables.resolve_regulator(q) {
        return QueryKind::Regulator {
            regulator: regulator.to_string(),
        };
    }
    QueryKind::Thematic
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryOptions {
    pub top_k: usize,
    /// Results scoring below this are dropped.
    pub min_score: f32,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_score: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchBreakdown {
    #[serde(flatten)]
    pub kind: QueryKind,
    pub entity_signal: f32,
    pub semantic: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_ticker: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matched_reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub story: Arc<StoryWithImpact>,
    pub score: f32,
    pub breakdown: MatchBreakdown,
}

fn validate_query(text: &str) -> CoreResult<()> {
    if text.chars().count() > MAX_QUERY_CHARS {
        return Err(CoreError::invalid(
            "query",
            format!("longer than {MAX_QUERY_CHARS} characters"),
        ));
    }
    if text.chars().any(|c| c.is_control() && !c.is_whitespace()) {
        return Err(CoreError::invalid("query", "contains control characters"));
    }
    Ok(())
}

/// Rank `catalog` against `text`, keeping the best `top_k`.
pub fn query(
    text: &str,
    catalog: &[Arc<StoryWithImpact>],
    top_k: usize,
    embedder: &dyn Embedder,
    config: &NewsConfig,
) -> CoreResult<Vec<QueryResult>> {
    query_with(
        text,
        catalog,
        QueryOptions {
            top_k,
            ..QueryOptions::default()
        },
        embedder,
        config,
    )
}

pub fn query_with(
    text: &str,
    catalog: &[Arc<StoryWithImpact>],
    opts: QueryOptions,
    embedder: &dyn Embedder,
    config: &NewsConfig,
) -> CoreResult<Vec<QueryResult>> {
    let started = Instant::now();
    validate_query(text)?;

    let kind = classify(text, &config.tables);
    counter!("query_requests_total", "kind" => kind.label()).increment(1);

    if catalog.is_empty() || opts.top_k == 0 {
        return Ok(Vec::new());
    }

    let query_vec = match checked_embed(embedder, text) {
        Ok(v) => Some(v),
        Err(e) if e.is_input_rejection() => {
            debug!(target: "query", reason = %e, "query not embeddable; entity signal only");
            None
        }
        Err(e) => return Err(e.into()),
    };

    let tuning = &config.tuning;
    let mut results: Vec<QueryResult> = Vec::new();
    for s in catalog {
        let matched = kind.matched_stock(s);
        if matched.is_none() && kind != QueryKind::Thematic {
            continue;
        }
        let entity_signal = matched.map(|m| m.confidence).unwrap_or(0.0);
        let semantic = match (query_vec.as_deref(), s.story.canonical_embedding.as_deref()) {
            (Some(q), Some(c)) => cosine_similarity(q, c).max(0.0),
            _ => 0.0,
        };
        let score = tuning.entity_weight * entity_signal + tuning.semantic_weight * semantic;
        if score < opts.min_score {
            continue;
        }
        results.push(QueryResult {
            story: Arc::clone(s),
            score,
            breakdown: MatchBreakdown {
                kind: kind.clone(),
                entity_signal,
                semantic,
                matched_ticker: matched.map(|m| m.ticker.clone()),
                matched_reasons: matched
                    .map(|m| m.reasons.iter().map(ToString::to_string).collect())
                    .unwrap_or_default(),
            },
        });
    }

    results.sort_by(rank_order);
    results.truncate(opts.top_k);

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    histogram!("query_latency_ms").record(elapsed_ms);
    dev_log_query(text, &kind, &results);
    Ok(results)
}

/// Score desc, then newer `updated_at`, then story id.
fn rank_order(a: &QueryResult, b: &QueryResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.story.story.updated_at.cmp(&a.story.story.updated_at))
        .then_with(|| a.story.story.id.cmp(&b.story.story.id))
}

fn dev_log_query(text: &str, kind: &QueryKind, results: &[QueryResult]) {
    if !dev_logging_enabled() {
        return;
    }
    let id = anon_hash(text);
    let top: Vec<&str> = results.iter().take(3).map(|r| r.story.story.id.as_str()).collect();
    // Never log raw query text.
    info!(
        target: "query",
        %id,
        kind = kind.label(),
        results = results.len(),
        top = ?top
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tuning;
    use crate::error::ProviderError;
    use crate::model::{ArticleTags, ImpactReason, Story};
    use chrono::{TimeZone, Utc};

    fn cfg() -> NewsConfig {
        NewsConfig::builtin().unwrap()
    }

    /// [1,0] for HDFC-ish text, [0,1] for everything else.
    struct TwoAxis;

    impl Embedder for TwoAxis {
        fn name(&self) -> &str {
            "two-axis"
        }
        fn dimension(&self) -> usize {
            2
        }
        fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            if text.to_lowercase().contains("hdfc") {
                Ok(vec![1.0, 0.0])
            } else {
                Ok(vec![0.0, 1.0])
            }
        }
    }

    struct Down;

    impl Embedder for Down {
        fn name(&self) -> &str {
            "down"
        }
        fn dimension(&self) -> usize {
            2
        }
        fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Err(ProviderError::Timeout {
                provider: "down".into(),
                after_ms: 100,
            })
        }
    }

    fn entry(
        id: &str,
        minute: u32,
        emb: Vec<f32>,
        impacted: Vec<ImpactedStock>,
    ) -> Arc<StoryWithImpact> {
        let ts = Utc.with_ymd_and_hms(2024, 5, 2, 9, minute, 0).unwrap();
        Arc::new(StoryWithImpact {
            story: Story {
                id: id.into(),
                headline: id.into(),
                summary: String::new(),
                body: String::new(),
                canonical_article_id: id.into(),
                members: vec![id.into()],
                sources: vec![],
                tags: ArticleTags::default(),
                centroid: Some(emb.clone()),
                canonical_embedding: Some(emb),
                created_at: ts,
                updated_at: ts,
            },
            impacted,
            sentiment: None,
            sentiment_score: None,
        })
    }

    fn direct(ticker: &str) -> ImpactedStock {
        ImpactedStock {
            ticker: ticker.into(),
            confidence: 1.0,
            reasons: vec![ImpactReason::DirectMention {
                alias: ticker.into(),
            }],
        }
    }

    fn via_sector(ticker: &str, sector: &str) -> ImpactedStock {
        ImpactedStock {
            ticker: ticker.into(),
            confidence: 0.7,
            reasons: vec![ImpactReason::Sector {
                sector: sector.into(),
            }],
        }
    }

    fn via_regulator(ticker: &str) -> ImpactedStock {
        ImpactedStock {
            ticker: ticker.into(),
            confidence: 0.6,
            reasons: vec![ImpactReason::Regulator {
                regulator: "RBI".into(),
                sector: "Banking".into(),
            }],
        }
    }

    fn catalog() -> Vec<Arc<StoryWithImpact>> {
        vec![
            entry("hdfc", 1, vec![1.0, 0.0], vec![direct("HDFCBANK")]),
            entry("infy", 2, vec![0.0, 1.0], vec![direct("INFY")]),
            entry(
                "banks",
                3,
                vec![0.6, 0.8],
                vec![via_sector("AXISBANK", "Banking"), via_sector("HDFCBANK", "Banking")],
            ),
            entry("rbi", 4, vec![0.0, 1.0], vec![via_regulator("HDFCBANK"), via_regulator("SBIN")]),
        ]
    }

    fn ids(r: &[QueryResult]) -> Vec<&str> {
        r.iter().map(|x| x.story.story.id.as_str()).collect()
    }

    #[test]
    fn classification_order() {
        let t = &cfg().tables;
        assert_eq!(
            classify("hdfc bank", t),
            QueryKind::Entity {
                ticker: "HDFCBANK".into()
            }
        );
        assert_eq!(
            classify("HDFCBANK", t),
            QueryKind::Entity {
                ticker: "HDFCBANK".into()
            }
        );
        assert_eq!(
            classify("banking", t),
            QueryKind::Sector {
                sector: "Banking".into()
            }
        );
        assert_eq!(
            classify("Reserve Bank of India", t),
            QueryKind::Regulator {
                regulator: "RBI".into()
            }
        );
        assert_eq!(classify("HDFC Bank news", t), QueryKind::Thematic);
        assert_eq!(classify("   ", t), QueryKind::Thematic);
    }

    #[test]
    fn entity_query_restricts_and_weights() {
        let out = query("HDFCBANK", &catalog(), 10, &TwoAxis, &cfg()).unwrap();
        assert_eq!(ids(&out), vec!["hdfc", "banks", "rbi"]);
        // 0.6 * 1.0 + 0.4 * cos([1,0],[1,0])
        assert!((out[0].score - 1.0).abs() < 1e-6);
        assert_eq!(out[0].breakdown.entity_signal, 1.0);
        assert_eq!(out[0].breakdown.matched_ticker.as_deref(), Some("HDFCBANK"));
        assert!(out
            .iter()
            .all(|r| r.story.stock("HDFCBANK").is_some()));
    }

    #[test]
    fn sector_query_includes_regulator_reasons_for_sector() {
        // rbi: 0.6*0.6 + 0.4*1.0 = 0.76; banks: 0.6*0.7 + 0.4*0.8 = 0.74
        let out = query("Banking", &catalog(), 10, &TwoAxis, &cfg()).unwrap();
        assert_eq!(ids(&out), vec!["rbi", "banks"]);
        assert_eq!(out[0].breakdown.entity_signal, 0.6);
        assert_eq!(out[1].breakdown.entity_signal, 0.7);
        assert_eq!(out[1].breakdown.matched_ticker.as_deref(), Some("AXISBANK"));
    }

    #[test]
    fn regulator_query_matches_regulator_reasons_only() {
        let out = query("RBI", &catalog(), 10, &TwoAxis, &cfg()).unwrap();
        assert_eq!(ids(&out), vec!["rbi"]);
    }

    #[test]
    fn thematic_query_ranks_semantically() {
        let out = query("HDFC Bank news", &catalog(), 2, &TwoAxis, &cfg()).unwrap();
        assert_eq!(ids(&out), vec!["hdfc", "banks"]);
        assert_eq!(out[0].breakdown.entity_signal, 0.0);
    }

    #[test]
    fn ties_prefer_newer_stories() {
        // "infy" and "rbi" both score 0.4 * 1.0 on a non-HDFC thematic query.
        let out = query("markets today", &catalog(), 4, &TwoAxis, &cfg()).unwrap();
        assert_eq!(ids(&out)[..2], ["rbi", "infy"]);
    }

    #[test]
    fn empty_query_and_catalog() {
        assert!(query("", &[], 5, &TwoAxis, &cfg()).unwrap().is_empty());
        assert!(query("", &[], 5, &Down, &cfg()).unwrap().is_empty());
    }

    #[test]
    fn unembeddable_query_uses_entity_signal_only() {
        let out = query("   ", &catalog(), 10, &TwoAxis, &cfg()).unwrap();
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|r| r.score == 0.0));
    }

    #[test]
    fn provider_outage_fails_the_query() {
        let err = query("HDFCBANK", &catalog(), 5, &Down, &cfg()).unwrap_err();
        assert!(matches!(err, CoreError::Provider(ProviderError::Timeout { .. })));
    }

    #[test]
    fn malformed_query_is_invalid_input() {
        let long = "a".repeat(MAX_QUERY_CHARS + 1);
        for q in [long.as_str(), "bad\u{0007}bell"] {
            let err = query(q, &catalog(), 5, &TwoAxis, &cfg()).unwrap_err();
            assert!(matches!(err, CoreError::InvalidInput { .. }));
        }
        assert!(query("tab\tand\nnewline", &catalog(), 5, &TwoAxis, &cfg()).is_ok());
    }

    #[test]
    fn min_score_and_top_k() {
        let opts = QueryOptions {
            top_k: 10,
            min_score: 0.5,
        };
        let out = query_with("HDFC Bank news", &catalog(), opts, &TwoAxis, &cfg()).unwrap();
        assert!(out.is_empty());
        assert!(query("HDFCBANK", &catalog(), 0, &TwoAxis, &cfg()).unwrap().is_empty());
    }

    #[test]
    fn repeated_queries_are_identical() {
        let c = catalog();
        let a = query("Banking", &c, 5, &TwoAxis, &cfg()).unwrap();
        let b = query("Banking", &c, 5, &TwoAxis, &cfg()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn anon_hash_is_short_and_stable() {
        assert_eq!(anon_hash("abc"), anon_hash("abc"));
        assert_eq!(anon_hash("abc").len(), 12);
        assert_ne!(anon_hash("abc"), anon_hash("abd"));
    }

    #[test]
    fn breakdown_serializes_kind_flat() {
        let out = query("HDFCBANK", &catalog(), 5, &TwoAxis, &cfg()).unwrap();
        let json = serde_json::to_value(&out[0].breakdown).unwrap();
        assert_eq!(json["kind"], "entity");
        assert_eq!(json["ticker"], "HDFCBANK");
        assert_eq!(json["matched_ticker"], "HDFCBANK");

        let thematic = query("monsoon outlook", &catalog(), 5, &TwoAxis, &cfg()).unwrap();
        let json = serde_json::to_value(&thematic[0].breakdown).unwrap();
        assert_eq!(json["kind"], "thematic");
    }

    #[test]
    fn tuning_min_score_does_not_filter_core_query() {
        let strict = cfg()
            .with_tuning(Tuning {
                min_score: 0.99,
                ..Tuning::default()
            })
            .unwrap();
        let out = query("monsoon outlook", &catalog(), 5, &TwoAxis, &strict).unwrap();
        assert!(!out.is_empty());
    }
}
