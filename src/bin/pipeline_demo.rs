//! Demo: ingest the mock dataset, cluster, map impacts and run a few queries (stdout only).

use anyhow::{Context, Result};
use market_news_intel::catalog::build_catalog;
use market_news_intel::ingest::{dataset_path_from_env, load_articles_jsonl};
use market_news_intel::providers::{HashingEmbedder, NullExtractor};
use market_news_intel::query::QueryOptions;
use market_news_intel::{ImpactMapper, NewsConfig};

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let config = NewsConfig::from_env().context("news rules")?;
    let embedder = HashingEmbedder::new(config.tuning.embedding_dim);
    let mapper = ImpactMapper::new(config.clone())?;

    let path = dataset_path_from_env();
    let loaded = load_articles_jsonl(&path)?;
    let (catalog, report) = build_catalog(&loaded.articles, &embedder, &NullExtractor, &mapper)?;

    println!(
        "{} articles -> {} stories ({} rejected, {} without impact)",
        report.articles,
        report.stories,
        report.rejected.len(),
        report.unmapped.len()
    );
    for s in catalog.stories() {
        println!("\n[{}] {}", s.story.id, s.story.headline);
        println!("  sources: {}", s.story.sources.join(", "));
        for st in &s.impacted {
            println!("  {:<10} {:.2}  {}", st.ticker, st.confidence, st.reason());
        }
    }

    for q in ["HDFC Bank news", "HDFCBANK", "Banking", "RBI", "IT services deal wins"] {
        let results = catalog.query(q, QueryOptions::default(), &embedder, &config)?;
        let kind = results.first().map(|r| r.breakdown.kind.label()).unwrap_or("-");
        println!("\nquery: {q:?} ({kind})");
        for r in results {
            println!("  {:.3}  {}", r.score, r.story.story.headline);
        }
    }

    println!("\npipeline-demo done");
    Ok(())
}
