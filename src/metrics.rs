use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

// The recorder is process-global; tests build the app many times.
static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder (once per process) and publish the cache TTL.
    pub fn init(cache_ttl_secs: u64) -> anyhow::Result<Self> {
        let handle = HANDLE
            .get_or_try_init(|| PrometheusBuilder::new().install_recorder())?
            .clone();

        describe();
        // absolute TTL, no sliding refresh
        gauge!("research_cache_ttl_seconds").set(cache_ttl_secs as f64);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "research_requests_total",
            "Search and discover requests, labelled by cache HIT/MISS."
        );
        describe_counter!(
            "research_source_requests_total",
            "Source calls by source and outcome status."
        );
        describe_counter!(
            "research_source_offers_total",
            "Offers returned per source before filtering."
        );
        describe_counter!("research_cache_hits_total", "Result cache hits.");
        describe_counter!("research_cache_misses_total", "Result cache misses.");
        describe_counter!(
            "research_filter_rejects_total",
            "Offers rejected by the fake-program filter."
        );
        describe_counter!(
            "research_dedup_removed_total",
            "Offers removed as duplicates."
        );
        describe_histogram!(
            "research_pipeline_seconds",
            "Wall time of a search or discover call, cache hits included."
        );
        describe_gauge!("research_cache_ttl_seconds", "Configured result cache TTL.");
    });
}
