// src/catalog.rs
//! Published catalog of enriched stories.
//!
//! A `Catalog` is an immutable snapshot. Re-ingestion builds a new one and
//! swaps it into the `CatalogHandle`; readers holding the old `Arc` keep a
//! consistent view until they drop it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::config::NewsConfig;
use crate::dedup::cluster;
use crate::error::CoreResult;
use crate::impact::ImpactMapper;
use crate::model::{Article, StoryWithImpact};
use crate::providers::{Embedder, EntityExtractor};
use crate::query::{query_with, QueryOptions, QueryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub story_id: String,
    pub headline: String,
    pub level: AlertLevel,
    pub reason: String,
    pub tickers: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    stories: Vec<Arc<StoryWithImpact>>,
    built_at: DateTime<Utc>,
    article_count: usize,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(Vec::new(), 0)
    }
}

impl Catalog {
    /// Stories are kept newest first (ties by id).
    pub fn new(mut stories: Vec<StoryWithImpact>, article_count: usize) -> Self {
        stories.sort_by(|a, b| {
            b.story
                .updated_at
                .cmp(&a.story.updated_at)
                .then_with(|| a.story.id.cmp(&b.story.id))
        });
        Self {
            stories: stories.into_iter().map(Arc::new).collect(),
            built_at: Utc::now(),
            article_count,
        }
    }

    pub fn stories(&self) -> &[Arc<StoryWithImpact>] {
        &self.stories
    }

    pub fn len(&self) -> usize {
        self.stories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stories.is_empty()
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn article_count(&self) -> usize {
        self.article_count
    }

    pub fn get(&self, story_id: &str) -> Option<&Arc<StoryWithImpact>> {
        self.stories.iter().find(|s| s.story.id == story_id)
    }

    /// Stories impacting `symbol` at or above `min_confidence`,
    /// strongest first, then newest.
    pub fn stories_for_ticker(
        &self,
        symbol: &str,
        min_confidence: f32,
    ) -> Vec<(Arc<StoryWithImpact>, f32)> {
        let mut out: Vec<(Arc<StoryWithImpact>, f32)> = self
            .stories
            .iter()
            .filter_map(|s| {
                s.stock(symbol)
                    .filter(|st| st.confidence >= min_confidence)
                    .map(|st| (Arc::clone(s), st.confidence))
            })
            .collect();
        out.sort_by(|(a, ca), (b, cb)| {
            cb.total_cmp(ca)
                .then_with(|| b.story.updated_at.cmp(&a.story.updated_at))
        });
        out
    }

    /// High: some ticker at or above `min_confidence`.
    /// Medium: otherwise, any regulator-triggered impact.
    pub fn alerts(&self, min_confidence: f32) -> Vec<Alert> {
        let mut out = Vec::new();
        for s in &self.stories {
            let strong: Vec<String> = s
                .impacted
                .iter()
                .filter(|st| st.confidence >= min_confidence)
                .map(|st| st.ticker.clone())
                .collect();
            let (level, reason, tickers) = if !strong.is_empty() {
                let reason = format!(
                    "impact {:.2} on {}",
                    s.max_confidence(),
                    strong.join(", ")
                );
                (AlertLevel::High, reason, strong)
            } else if s.has_regulatory_impact() {
                let mut regulators: Vec<&str> = s
                    .impacted
                    .iter()
                    .flat_map(|st| st.reasons.iter())
                    .filter_map(|r| r.regulator())
                    .collect();
                regulators.sort_unstable();
                regulators.dedup();
                let reason = format!("regulatory action: {}", regulators.join(", "));
                let tickers = s.impacted.iter().map(|st| st.ticker.clone()).collect();
                (AlertLevel::Medium, reason, tickers)
            } else {
                continue;
            };
            out.push(Alert {
                story_id: s.story.id.clone(),
                headline: s.story.headline.clone(),
                level,
                reason,
                tickers,
                updated_at: s.story.updated_at,
            });
        }
        out.sort_by(|a, b| b.level.cmp(&a.level).then_with(|| b.updated_at.cmp(&a.updated_at)));
        out
    }

    pub fn query(
        &self,
        text: &str,
        opts: QueryOptions,
        embedder: &dyn Embedder,
        config: &NewsConfig,
    ) -> CoreResult<Vec<QueryResult>> {
        query_with(text, &self.stories, opts, embedder, config)
    }
}

/// One rejected input, as reported after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedItem {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub articles: usize,
    pub stories: usize,
    pub rejected: Vec<RejectedItem>,
    /// Articles that could not be embedded and stand alone.
    pub unembedded: Vec<String>,
    /// Stories with no impacted ticker.
    pub unmapped: Vec<String>,
    /// Stories the impact stage refused.
    pub skipped_stories: Vec<String>,
}

/// cluster -> map_impact -> snapshot.
pub fn build_catalog(
    articles: &[Article],
    embedder: &dyn Embedder,
    extractor: &dyn EntityExtractor,
    mapper: &ImpactMapper,
) -> CoreResult<(Catalog, IngestReport)> {
    let outcome = cluster(articles, embedder, &mapper.config().tuning)?;
    let (enriched, skipped) = mapper.enrich_all(outcome.stories, extractor)?;

    let report = IngestReport {
        articles: articles.len(),
        stories: enriched.len(),
        rejected: outcome
            .rejected
            .iter()
            .map(|r| RejectedItem {
                index: r.index,
                reason: r.error.to_string(),
            })
            .collect(),
        unembedded: outcome.unembedded,
        unmapped: enriched
            .iter()
            .filter(|s| s.impacted.is_empty())
            .map(|s| s.story.id.clone())
            .collect(),
        skipped_stories: skipped.iter().map(ToString::to_string).collect(),
    };

    if !report.rejected.is_empty() {
        warn!(target: "catalog", rejected = report.rejected.len(), "articles rejected during ingest");
    }
    info!(
        target: "catalog",
        articles = report.articles,
        stories = report.stories,
        unmapped = report.unmapped.len(),
        "catalog built"
    );

    Ok((Catalog::new(enriched, articles.len()), report))
}

/// Shared, swappable pointer to the current snapshot.
#[derive(Debug, Clone, Default)]
pub struct CatalogHandle {
    inner: Arc<RwLock<Arc<Catalog>>>,
}

impl CatalogHandle {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(catalog))),
        }
    }

    /// Current snapshot; cheap, never blocks on in-flight queries.
    pub fn snapshot(&self) -> Arc<Catalog> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Publish `catalog`, returning the previous snapshot.
    pub fn swap(&self, catalog: Catalog) -> Arc<Catalog> {
        let next = Arc::new(catalog);
        let mut guard = match self.inner.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, next)
    }
}
