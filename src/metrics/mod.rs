/// Prometheus metrics for indexing, enrichment and search.
///
/// Metrics are additive observability only; nothing in the pipeline reads them back.
///
/// # Example
/// ```no_run
/// use findaphoto::metrics::SEARCH_REQUESTS_TOTAL;
///
/// SEARCH_REQUESTS_TOTAL.with_label_values(&["nearby"]).inc();
/// ```
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, Opts, Registry, TextEncoder,
};

const NAMESPACE: &str = "findaphoto";

lazy_static! {
    /// Crate registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    /// Documents accepted by the search engine through bulk upserts
    pub static ref DOCUMENTS_INDEXED_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("documents_indexed_total", "Documents accepted by bulk upserts")
            .namespace(NAMESPACE)
    ).expect("Failed to create DOCUMENTS_INDEXED_TOTAL metric");

    /// Individual documents rejected inside a bulk upsert
    pub static ref BULK_ITEM_FAILURES_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("bulk_item_failures_total", "Documents rejected inside bulk upserts")
            .namespace(NAMESPACE)
    ).expect("Failed to create BULK_ITEM_FAILURES_TOTAL metric");

    /// Tag lookups per provider
    ///
    /// Labels: provider, outcome (cached, tagged, quota, error, skipped)
    pub static ref TAG_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("tag_requests_total", "Tag lookups by provider and outcome")
            .namespace(NAMESPACE),
        &["provider", "outcome"]
    ).expect("Failed to create TAG_REQUESTS_TOTAL metric");

    /// Search requests by kind
    ///
    /// Labels: kind (search, range, term, nearby, by_day)
    pub static ref SEARCH_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("search_requests_total", "Search requests by kind")
            .namespace(NAMESPACE),
        &["kind"]
    ).expect("Failed to create SEARCH_REQUESTS_TOTAL metric");

    /// Search round trip duration in seconds
    pub static ref SEARCH_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("search_duration_seconds", "Search round trip duration in seconds")
            .namespace(NAMESPACE)
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["kind"]
    ).expect("Failed to create SEARCH_DURATION_SECONDS metric");
}

/// Register all metrics with the crate registry
pub fn init_metrics() -> Result<(), prometheus::Error> {
    PROMETHEUS_REGISTRY.register(Box::new(DOCUMENTS_INDEXED_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(BULK_ITEM_FAILURES_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(TAG_REQUESTS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_REQUESTS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_DURATION_SECONDS.clone()))?;
    Ok(())
}

/// Render the registry in the text exposition format
pub fn gather_text() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&PROMETHEUS_REGISTRY.gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let before = TAG_REQUESTS_TOTAL
            .with_label_values(&["azure", "cached"])
            .get();
        TAG_REQUESTS_TOTAL
            .with_label_values(&["azure", "cached"])
            .inc();
        let after = TAG_REQUESTS_TOTAL
            .with_label_values(&["azure", "cached"])
            .get();
        assert!((after - before - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_gather_text_exposes_registered_metrics() {
        // Another test may have registered already
        let _ = init_metrics();
        DOCUMENTS_INDEXED_TOTAL.inc();

        let text = gather_text();
        assert!(text.contains("findaphoto_documents_indexed_total"), "{}", text);
    }
}
