// src/model.rs
//! Data model: articles in, stories and impacted stocks out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::sentiment::SentimentLabel;

/// Pre-existing tags some feeds attach to an article.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleTags {
    #[serde(default)]
    pub tickers: Vec<String>,
    #[serde(default)]
    pub sectors: Vec<String>,
    #[serde(default)]
    pub regulators: Vec<String>,
}

impl ArticleTags {
    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty() && self.sectors.is_empty() && self.regulators.is_empty()
    }

    /// Union with `other`, keeping each list sorted and distinct.
    pub fn merge(&mut self, other: &ArticleTags) {
        fn union(into: &mut Vec<String>, from: &[String]) {
            into.extend(from.iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()));
            into.sort();
            into.dedup();
        }
        union(&mut self.tickers, &other.tickers);
        union(&mut self.sectors, &other.sectors);
        union(&mut self.regulators, &other.regulators);
    }
}

/// One ingested news item. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    #[serde(alias = "title")]
    pub headline: String,
    pub body: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, flatten)]
    pub tags: ArticleTags,
}

impl Article {
    /// Rejects articles the clustering stage cannot track.
    pub fn validate(&self) -> CoreResult<()> {
        if self.id.trim().is_empty() {
            let item = if self.headline.is_empty() {
                "<untitled>".to_string()
            } else {
                self.headline.clone()
            };
            return Err(CoreError::invalid(item, "article id is missing"));
        }
        Ok(())
    }

    /// Headline plus the leading `excerpt_chars` characters of the body.
    pub fn embedding_text(&self, excerpt_chars: usize) -> String {
        let excerpt = leading_chars(self.body.trim(), excerpt_chars);
        let headline = self.headline.trim();
        match (headline.is_empty(), excerpt.is_empty()) {
            (true, true) => String::new(),
            (false, true) => headline.to_string(),
            (true, false) => excerpt.to_string(),
            (false, false) => format!("{headline}. {excerpt}"),
        }
    }

    pub fn body_chars(&self) -> usize {
        self.body.trim().chars().count()
    }
}

/// Longest prefix of `s` holding at most `n` chars, cut on a char boundary.
pub fn leading_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// A cluster of articles reporting the same event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub headline: String,
    /// Canonical body truncated for display.
    pub summary: String,
    /// Full canonical body, the text the impact stage reads.
    pub body: String,
    pub canonical_article_id: String,
    /// Member article ids in input order.
    pub members: Vec<String>,
    /// Distinct member sources, first-seen order.
    pub sources: Vec<String>,
    pub tags: ArticleTags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub centroid: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Story {
    pub fn canonical_text(&self) -> String {
        let headline = self.headline.trim();
        let body = self.body.trim();
        if body.is_empty() {
            headline.to_string()
        } else if headline.is_empty() {
            body.to_string()
        } else {
            format!("{headline}. {body}")
        }
    }

    pub fn contains(&self, article_id: &str) -> bool {
        self.members.iter().any(|m| m == article_id)
    }
}

/// Signal that linked a story to a ticker. The order is the tier order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Direct,
    Sector,
    Regulator,
}

impl SignalKind {
    /// Fixed confidence tier for this signal.
    pub fn confidence(self) -> f32 {
        match self {
            SignalKind::Direct => 1.0,
            SignalKind::Sector => 0.7,
            SignalKind::Regulator => 0.6,
        }
    }
}

/// Why a ticker was reached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImpactReason {
    DirectMention { alias: String },
    Sector { sector: String },
    Regulator { regulator: String, sector: String },
}

impl ImpactReason {
    pub fn signal(&self) -> SignalKind {
        match self {
            ImpactReason::DirectMention { .. } => SignalKind::Direct,
            ImpactReason::Sector { .. } => SignalKind::Sector,
            ImpactReason::Regulator { .. } => SignalKind::Regulator,
        }
    }

    /// Sector this reason refers to, if any.
    pub fn sector(&self) -> Option<&str> {
        match self {
            ImpactReason::DirectMention { .. } => None,
            ImpactReason::Sector { sector } | ImpactReason::Regulator { sector, .. } => {
                Some(sector)
            }
        }
    }

    pub fn regulator(&self) -> Option<&str> {
        match self {
            ImpactReason::Regulator { regulator, .. } => Some(regulator),
            _ => None,
        }
    }
}

impl fmt::Display for ImpactReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImpactReason::DirectMention { .. } => f.write_str("direct mention"),
            ImpactReason::Sector { sector } => write!(f, "sector: {sector}"),
            ImpactReason::Regulator { regulator, sector } => {
                write!(f, "regulator: {regulator} ({sector})")
            }
        }
    }
}

/// A ticker judged affected by a story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactedStock {
    pub ticker: String,
    pub confidence: f32,
    pub reasons: Vec<ImpactReason>,
}

impl ImpactedStock {
    /// Reasons joined for display, e.g. `direct mention; sector: Banking`.
    pub fn reason(&self) -> String {
        self.reasons
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn references_sector(&self, sector: &str) -> bool {
        self.reasons
            .iter()
            .filter_map(ImpactReason::sector)
            .any(|s| s.eq_ignore_ascii_case(sector))
    }

    pub fn references_regulator(&self, regulator: &str) -> bool {
        self.reasons
            .iter()
            .filter_map(ImpactReason::regulator)
            .any(|r| r.eq_ignore_ascii_case(regulator))
    }
}

/// A story plus its resolved impacts. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryWithImpact {
    pub story: Story,
    pub impacted: Vec<ImpactedStock>,
    #[serde(default)]
    pub sentiment: Option<SentimentLabel>,
    #[serde(default)]
    pub sentiment_score: Option<f32>,
}

impl StoryWithImpact {
    pub fn stock(&self, ticker: &str) -> Option<&ImpactedStock> {
        self.impacted
            .iter()
            .find(|s| s.ticker.eq_ignore_ascii_case(ticker))
    }

    pub fn max_confidence(&self) -> f32 {
        self.impacted
            .iter()
            .map(|s| s.confidence)
            .fold(0.0, f32::max)
    }

    pub fn has_regulatory_impact(&self) -> bool {
        self.impacted
            .iter()
            .flat_map(|s| s.reasons.iter())
            .any(|r| r.signal() == SignalKind::Regulator)
    }
}
