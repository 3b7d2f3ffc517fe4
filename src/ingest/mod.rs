// src/ingest/mod.rs
//! Dataset loading: JSONL feed records -> normalized `Article`s.
pub mod types;

use anyhow::{Context, Result};
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::ingest::types::RawRecord;
use crate::model::{Article, ArticleTags};
use crate::providers::short_hash;

pub const DEFAULT_DATASET_PATH: &str = "data/mock_news.jsonl";
pub const ENV_DATASET_PATH: &str = "NEWS_DATASET_PATH";

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Decode HTML entities, strip tags, fold typographic quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let stripped = RE_TAGS.replace_all(&decoded, " ");
    let folded = stripped
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    RE_WS.replace_all(&folded, " ").trim().to_string()
}

/// `normalize_text` plus trailing sentence punctuation removed.
pub fn normalize_headline(s: &str) -> String {
    let mut out = normalize_text(s);
    while out.ends_with(['!', '?', '.', ',']) {
        out.pop();
    }
    out
}

/// `a-` + 12 hex chars of SHA-256 over source, timestamp and title.
pub fn content_id(source: &str, published_at: &str, title: &str) -> String {
    format!("a-{}", short_hash([source, published_at, title]))
}

impl From<RawRecord> for Article {
    fn from(r: RawRecord) -> Self {
        let headline = normalize_headline(&r.title);
        let source = normalize_text(&r.source);
        let id = r
            .id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| content_id(&source, &r.published_at.to_rfc3339(), &headline));
        let mut tags = ArticleTags::default();
        tags.merge(&ArticleTags {
            tickers: r.tickers,
            sectors: r.sectors,
            regulators: r.regulators,
        });
        Article {
            id,
            headline,
            body: normalize_text(&r.body),
            source,
            published_at: r.published_at,
            url: r.url.filter(|u| !u.trim().is_empty()),
            tags,
        }
    }
}

#[derive(Debug, Default)]
pub struct LoadedArticles {
    pub articles: Vec<Article>,
    /// 1-based line numbers that failed to parse.
    pub malformed_lines: Vec<usize>,
}

/// Parse JSONL; blank lines are ignored, malformed ones skipped and counted.
pub fn parse_articles_jsonl(content: &str) -> LoadedArticles {
    let mut out = LoadedArticles::default();
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<RawRecord>(line) {
            Ok(rec) => out.articles.push(rec.into()),
            Err(e) => {
                warn!(target: "ingest", line = i + 1, error = %e, "malformed record skipped");
                out.malformed_lines.push(i + 1);
            }
        }
    }
    counter!("ingest_malformed_total").increment(out.malformed_lines.len() as u64);
    out
}

pub fn load_articles_jsonl(path: &Path) -> Result<LoadedArticles> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let loaded = parse_articles_jsonl(&content);
    info!(
        target: "ingest",
        path = %path.display(),
        articles = loaded.articles.len(),
        malformed = loaded.malformed_lines.len(),
        "dataset loaded"
    );
    Ok(loaded)
}

/// `NEWS_DATASET_PATH` or the default location.
pub fn dataset_path_from_env() -> PathBuf {
    std::env::var(ENV_DATASET_PATH)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATASET_PATH))
}
