// src/lib.rs
// Public library surface for the service binary, the demo and integration tests.

pub mod api;
pub mod catalog;
pub mod config;
pub mod dedup;
pub mod error;
pub mod impact;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod providers;
pub mod query;
pub mod sentiment;
pub mod text;

// ---- Re-exports for stable public API ----
pub use crate::api::{app, create_router, AppState};
pub use crate::catalog::{build_catalog, Catalog, CatalogHandle, IngestReport};
pub use crate::config::NewsConfig;
pub use crate::dedup::{cluster, ClusterOutcome};
pub use crate::error::{CoreError, CoreResult, ProviderError};
pub use crate::impact::ImpactMapper;
pub use crate::model::{Article, ImpactedStock, Story, StoryWithImpact};
pub use crate::query::{query, query_with, QueryKind, QueryOptions, QueryResult};
