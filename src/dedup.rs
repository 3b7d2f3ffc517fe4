// src/dedup.rs
//! Deduplication: collapse near-duplicate articles into stories.
//!
//! Two articles are the same story when BOTH hold:
//! - cosine(embedding_a, embedding_b) >= `sim_threshold`
//! - headline overlap (per `lexical_metric`) >= `lex_threshold`
//!
//! Stories are the connected components of that pairwise relation
//! (union-find). O(n²) comparisons per batch; no ANN index.
//!
//! Per-article isolation: a malformed article is rejected and reported,
//! an article the provider refuses to embed becomes a singleton story, and
//! only a systemic provider failure aborts the batch.

use chrono::{DateTime, Utc};
use metrics::counter;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::Tuning;
use crate::error::{CoreError, CoreResult};
use crate::model::{leading_chars, Article, ArticleTags, Story};
use crate::providers::{checked_embed, short_hash, Embedder};
use crate::text::{cosine_similarity, mean_vector};

pub const SUMMARY_CHARS: usize = 280;

/// An input article that could not be clustered.
#[derive(Debug)]
pub struct RejectedArticle {
    /// Position in the input batch.
    pub index: usize,
    pub error: CoreError,
}

#[derive(Debug, Default)]
pub struct ClusterOutcome {
    pub stories: Vec<Story>,
    pub rejected: Vec<RejectedArticle>,
    /// Articles kept as singletons because they could not be embedded.
    pub unembedded: Vec<String>,
}

/// Pairwise merge test.
pub fn same_story(cosine: f32, lexical: f32, tuning: &Tuning) -> bool {
    cosine >= tuning.sim_threshold && lexical >= tuning.lex_threshold
}

/// `story-` + 12 hex chars of SHA-256 over the sorted member ids.
pub fn story_id(members: &[String]) -> String {
    let mut sorted: Vec<&str> = members.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    format!("story-{}", short_hash(sorted))
}

/// Disjoint sets over `0..n`; the root of a set is its smallest index.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[x] != root {
            let next = self.parent[x];
            self.parent[x] = root;
            x = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }

    /// Components ordered by smallest member; members ascending.
    fn components(mut self) -> Vec<Vec<usize>> {
        let n = self.parent.len();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut slot_of_root = vec![usize::MAX; n];
        for i in 0..n {
            let r = self.find(i);
            if slot_of_root[r] == usize::MAX {
                slot_of_root[r] = groups.len();
                groups.push(Vec::new());
            }
            groups[slot_of_root[r]].push(i);
        }
        groups
    }
}

/// Cluster one batch of articles into stories.
pub fn cluster(
    articles: &[Article],
    embedder: &dyn Embedder,
    tuning: &Tuning,
) -> CoreResult<ClusterOutcome> {
    let mut outcome = ClusterOutcome::default();

    // (1) Validate; first occurrence of an id wins.
    let mut seen: HashSet<&str> = HashSet::new();
    let mut valid: Vec<&Article> = Vec::with_capacity(articles.len());
    for (index, a) in articles.iter().enumerate() {
        if let Err(error) = a.validate() {
            warn!(target: "dedup", index, error = %error, "article rejected");
            outcome.rejected.push(RejectedArticle { index, error });
            continue;
        }
        if !seen.insert(a.id.as_str()) {
            let error = CoreError::invalid(a.id.clone(), "duplicate article id in batch");
            warn!(target: "dedup", index, id = %a.id, "duplicate article id");
            outcome.rejected.push(RejectedArticle { index, error });
            continue;
        }
        valid.push(a);
    }

    // (2) Embed; input-level refusals degrade to "no embedding".
    let mut embeddings: Vec<Option<Vec<f32>>> = Vec::with_capacity(valid.len());
    for a in &valid {
        match checked_embed(embedder, &a.embedding_text(tuning.excerpt_chars)) {
            Ok(v) => embeddings.push(Some(v)),
            Err(e) if e.is_input_rejection() => {
                debug!(target: "dedup", id = %a.id, reason = %e, "article kept as singleton");
                outcome.unembedded.push(a.id.clone());
                embeddings.push(None);
            }
            Err(e) => return Err(e.into()),
        }
    }

    // (3) Pairwise edges.
    let mut uf = UnionFind::new(valid.len());
    for i in 0..valid.len() {
        let Some(ei) = embeddings[i].as_deref() else {
            continue;
        };
        for j in (i + 1)..valid.len() {
            let Some(ej) = embeddings[j].as_deref() else {
                continue;
            };
            let cos = cosine_similarity(ei, ej);
            if cos < tuning.sim_threshold {
                continue;
            }
            let lex = tuning
                .lexical_metric
                .overlap(&valid[i].headline, &valid[j].headline);
            if same_story(cos, lex, tuning) {
                debug!(
                    target: "dedup",
                    a = %valid[i].id, b = %valid[j].id, cos, lex,
                    "merge edge"
                );
                uf.union(i, j);
            }
        }
    }

    // (4) Components -> stories.
    for group in uf.components() {
        outcome
            .stories
            .push(build_story(&group, &valid, &embeddings));
    }

    counter!("dedup_articles_total").increment(articles.len() as u64);
    counter!("dedup_stories_total").increment(outcome.stories.len() as u64);
    counter!("dedup_rejected_total").increment(outcome.rejected.len() as u64);
    info!(
        target: "dedup",
        articles = articles.len(),
        stories = outcome.stories.len(),
        rejected = outcome.rejected.len(),
        unembedded = outcome.unembedded.len(),
        "batch clustered"
    );

    Ok(outcome)
}

/// Longest body wins; ties go to the earliest timestamp, then input order.
fn canonical_index(group: &[usize], valid: &[&Article]) -> usize {
    let mut best = group[0];
    for &i in &group[1..] {
        let (a, b) = (valid[i], valid[best]);
        let longer = a.body_chars() > b.body_chars();
        let tie_earlier = a.body_chars() == b.body_chars() && a.published_at < b.published_at;
        if longer || tie_earlier {
            best = i;
        }
    }
    best
}

fn build_story(group: &[usize], valid: &[&Article], embeddings: &[Option<Vec<f32>>]) -> Story {
    let canon_idx = canonical_index(group, valid);
    let canon = valid[canon_idx];

    let members: Vec<String> = group.iter().map(|&i| valid[i].id.clone()).collect();

    let mut sources: Vec<String> = Vec::new();
    let mut tags = ArticleTags::default();
    let mut created_at: DateTime<Utc> = canon.published_at;
    let mut updated_at: DateTime<Utc> = canon.published_at;
    for &i in group {
        let a = valid[i];
        let src = a.source.trim();
        if !src.is_empty() && !sources.iter().any(|s| s == src) {
            sources.push(src.to_string());
        }
        tags.merge(&a.tags);
        created_at = created_at.min(a.published_at);
        updated_at = updated_at.max(a.published_at);
    }

    let member_vecs: Vec<&[f32]> = group
        .iter()
        .filter_map(|&i| embeddings[i].as_deref())
        .collect();

    let body = canon.body.trim().to_string();
    Story {
        id: story_id(&members),
        headline: canon.headline.trim().to_string(),
        summary: leading_chars(&body, SUMMARY_CHARS).to_string(),
        body,
        canonical_article_id: canon.id.clone(),
        members,
        sources,
        tags,
        centroid: mean_vector(&member_vecs),
        canonical_embedding: embeddings[canon_idx].clone(),
        created_at,
        updated_at,
    }
}
