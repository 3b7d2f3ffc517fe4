// src/api.rs
//! HTTP surface over the catalog: listing, search, per-ticker view, alerts,
//! reload and metrics.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::catalog::{build_catalog, Alert, Catalog, CatalogHandle, IngestReport};
use crate::config::NewsConfig;
use crate::error::CoreError;
use crate::impact::ImpactMapper;
use crate::ingest::{dataset_path_from_env, load_articles_jsonl};
use crate::model::{ArticleTags, StoryWithImpact};
use crate::providers::{Embedder, EntityExtractor, HashingEmbedder, NullExtractor};
use crate::query::{MatchBreakdown, QueryOptions};
use crate::sentiment::SentimentLabel;

pub const MAX_TOP_K: usize = 20;
pub const DEFAULT_STOCK_MIN_CONFIDENCE: f32 = 0.3;
pub const DEFAULT_ALERT_MIN_CONFIDENCE: f32 = 0.9;

#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogHandle,
    pub config: NewsConfig,
    mapper: Arc<ImpactMapper>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn EntityExtractor>,
    dataset: PathBuf,
}

impl AppState {
    /// Build state and ingest `dataset` once.
    pub fn new(
        config: NewsConfig,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn EntityExtractor>,
        dataset: PathBuf,
    ) -> Result<Self> {
        let mapper = ImpactMapper::new(config.clone()).context("impact mapper")?;
        let state = Self {
            catalog: CatalogHandle::default(),
            config,
            mapper: Arc::new(mapper),
            embedder,
            extractor,
            dataset,
        };
        state.reload()?;
        Ok(state)
    }

    /// Config and dataset from env; built-in providers.
    pub fn from_env() -> Result<Self> {
        let config = NewsConfig::from_env().context("news rules")?;
        let embedder = Arc::new(HashingEmbedder::new(config.tuning.embedding_dim));
        Self::new(
            config,
            embedder,
            Arc::new(NullExtractor),
            dataset_path_from_env(),
        )
    }

    /// Re-ingest the dataset and publish a fresh snapshot.
    pub fn reload(&self) -> Result<ReloadResponse> {
        let loaded = load_articles_jsonl(&self.dataset)?;
        let (catalog, report) = build_catalog(
            &loaded.articles,
            self.embedder.as_ref(),
            self.extractor.as_ref(),
            &self.mapper,
        )
        .context("build catalog")?;
        self.catalog.swap(catalog);
        Ok(ReloadResponse {
            status: "ok",
            malformed_lines: loaded.malformed_lines,
            report,
        })
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stories", get(list_stories))
        .route("/query", get(query_stories))
        .route("/stock/{symbol}", get(stock_stories))
        .route("/alerts", get(alerts))
        .route("/admin/reload", post(admin_reload))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Full app: env-configured state, API routes and `/metrics`.
pub async fn app() -> Result<Router> {
    let handle = crate::metrics::install_recorder()?;
    let state = tokio::task::spawn_blocking(AppState::from_env)
        .await
        .context("startup ingest task")??;
    info!(
        target: "api",
        stories = state.catalog.snapshot().len(),
        "catalog ready"
    );
    Ok(create_router(state).merge(crate::metrics::router(handle)))
}

/* ----------------------------
Errors
---------------------------- */

#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    error: String,
}

impl ApiError {
    fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: msg.into(),
        }
    }

    fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: msg.into(),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        let status = match &e {
            CoreError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            CoreError::Provider(_) => StatusCode::BAD_GATEWAY,
            CoreError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status != StatusCode::BAD_REQUEST {
            error!(target: "api", error = %e, "request failed");
        }
        Self {
            status,
            error: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/* ----------------------------
Response shapes
---------------------------- */

#[derive(Debug, Serialize)]
pub struct ImpactOut {
    pub ticker: String,
    pub confidence: f32,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct StoryOut {
    pub id: String,
    pub headline: String,
    pub summary: String,
    pub sources: Vec<String>,
    pub members: Vec<String>,
    pub tags: ArticleTags,
    pub impacted: Vec<ImpactOut>,
    pub sentiment: Option<SentimentLabel>,
    pub sentiment_score: Option<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&StoryWithImpact> for StoryOut {
    fn from(s: &StoryWithImpact) -> Self {
        Self {
            id: s.story.id.clone(),
            headline: s.story.headline.clone(),
            summary: s.story.summary.clone(),
            sources: s.story.sources.clone(),
            members: s.story.members.clone(),
            tags: s.story.tags.clone(),
            impacted: s
                .impacted
                .iter()
                .map(|i| ImpactOut {
                    ticker: i.ticker.clone(),
                    confidence: i.confidence,
                    reason: i.reason(),
                })
                .collect(),
            sentiment: s.sentiment,
            sentiment_score: s.sentiment_score,
            created_at: s.story.created_at,
            updated_at: s.story.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthOut {
    status: &'static str,
    articles_loaded: usize,
    stories_indexed: usize,
    built_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct QueryHit {
    score: f32,
    breakdown: MatchBreakdown,
    story: StoryOut,
}

#[derive(Debug, Serialize)]
struct QueryOut {
    query: String,
    results: Vec<QueryHit>,
}

#[derive(Debug, Serialize)]
struct StockHit {
    confidence: f32,
    story: StoryOut,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub status: &'static str,
    pub malformed_lines: Vec<usize>,
    #[serde(flatten)]
    pub report: IngestReport,
}

/* ----------------------------
Handlers
---------------------------- */

async fn health(State(state): State<AppState>) -> Json<HealthOut> {
    let snap = state.catalog.snapshot();
    Json(HealthOut {
        status: "ok",
        articles_loaded: snap.article_count(),
        stories_indexed: snap.len(),
        built_at: snap.built_at(),
    })
}

async fn list_stories(State(state): State<AppState>) -> Json<Vec<StoryOut>> {
    let snap = state.catalog.snapshot();
    Json(snap.stories().iter().map(|s| StoryOut::from(s.as_ref())).collect())
}

#[derive(Debug, Deserialize)]
struct QueryParams {
    q: String,
    top_k: Option<usize>,
    min_score: Option<f32>,
}

async fn query_stories(
    State(state): State<AppState>,
    Query(p): Query<QueryParams>,
) -> Result<Json<QueryOut>, ApiError> {
    let top_k = p.top_k.unwrap_or(crate::query::DEFAULT_TOP_K);
    if !(1..=MAX_TOP_K).contains(&top_k) {
        return Err(ApiError::bad_request(format!(
            "top_k must be between 1 and {MAX_TOP_K}"
        )));
    }
    let min_score = p.min_score.unwrap_or(state.config.tuning.min_score);
    if !(0.0..=1.0).contains(&min_score) {
        return Err(ApiError::bad_request("min_score must be between 0 and 1"));
    }

    let snap: Arc<Catalog> = state.catalog.snapshot();
    let results = snap.query(
        &p.q,
        QueryOptions { top_k, min_score },
        state.embedder.as_ref(),
        &state.config,
    )?;

    Ok(Json(QueryOut {
        query: p.q,
        results: results
            .into_iter()
            .map(|r| QueryHit {
                score: r.score,
                story: StoryOut::from(r.story.as_ref()),
                breakdown: r.breakdown,
            })
            .collect(),
    }))
}

#[derive(Debug, Deserialize)]
struct ConfidenceParams {
    min_confidence: Option<f32>,
}

fn confidence_param(p: &ConfidenceParams, default: f32) -> Result<f32, ApiError> {
    let v = p.min_confidence.unwrap_or(default);
    if (0.0..=1.0).contains(&v) {
        Ok(v)
    } else {
        Err(ApiError::bad_request("min_confidence must be between 0 and 1"))
    }
}

async fn stock_stories(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(p): Query<ConfidenceParams>,
) -> Result<Json<Vec<StockHit>>, ApiError> {
    let min = confidence_param(&p, DEFAULT_STOCK_MIN_CONFIDENCE)?;
    let snap = state.catalog.snapshot();
    let hits = snap
        .stories_for_ticker(symbol.trim(), min)
        .into_iter()
        .map(|(s, confidence)| StockHit {
            confidence,
            story: StoryOut::from(s.as_ref()),
        })
        .collect();
    Ok(Json(hits))
}

async fn alerts(
    State(state): State<AppState>,
    Query(p): Query<ConfidenceParams>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    let min = confidence_param(&p, DEFAULT_ALERT_MIN_CONFIDENCE)?;
    Ok(Json(state.catalog.snapshot().alerts(min)))
}

async fn admin_reload(State(state): State<AppState>) -> Result<Json<ReloadResponse>, ApiError> {
    let task_state = state.clone();
    let outcome = tokio::task::spawn_blocking(move || task_state.reload())
        .await
        .map_err(|e| ApiError::internal(format!("reload task: {e}")))?;
    match outcome {
        Ok(resp) => {
            info!(target: "api", stories = resp.report.stories, "catalog reloaded");
            Ok(Json(resp))
        }
        Err(e) => {
            // Keep serving the previous snapshot.
            warn!(target: "api", error = %format!("{e:#}"), "reload failed");
            Err(ApiError::internal(format!("{e:#}")))
        }
    }
}
