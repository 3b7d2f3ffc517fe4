// src/metrics.rs
use anyhow::{Context, Result};
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use shuttle_axum::axum::{routing::get, Router};

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the process-wide Prometheus recorder (first call only) and return its handle.
pub fn install_recorder() -> Result<PrometheusHandle> {
    HANDLE
        .get_or_try_init(|| {
            // Use default buckets to avoid API differences across crate versions.
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .context("prometheus: install recorder")?;
            describe_series();
            Ok::<_, anyhow::Error>(handle)
        })
        .cloned()
}

fn describe_series() {
    describe_counter!("dedup_articles_total", "Articles submitted to clustering.");
    describe_counter!("dedup_stories_total", "Stories produced by clustering.");
    describe_counter!(
        "dedup_rejected_total",
        "Articles rejected as malformed during clustering."
    );
    describe_counter!("impact_stocks_total", "Impacted stocks emitted by the mapper.");
    describe_counter!(
        "impact_unmapped_total",
        "Entity spans with no rule-table entry."
    );
    describe_counter!("ingest_malformed_total", "Dataset lines that failed to parse.");
    describe_counter!("query_requests_total", "Queries served, by query kind.");
    describe_histogram!("query_latency_ms", "Query latency in milliseconds.");
}

/// Returns a router exposing `/metrics` with the Prometheus exposition format.
pub fn router(handle: PrometheusHandle) -> Router {
    Router::new().route(
        "/metrics",
        get(move || {
            let h = handle.clone();
            async move { h.render() }
        }),
    )
}
