// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One JSONL record as published by a feed. `id` is optional; tags default to empty.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RawRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub source: String, // e.g., "Economic Times", "Mint"
    pub published_at: DateTime<Utc>,
    #[serde(alias = "headline")]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub tickers: Vec<String>,
    #[serde(default)]
    pub sectors: Vec<String>,
    #[serde(default)]
    pub regulators: Vec<String>,
}
