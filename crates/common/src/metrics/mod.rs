//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// Metrics prefix for all Recall metrics
pub const METRICS_PREFIX: &str = "recall";

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Query metrics
    describe_counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of RAG queries"
    );

    describe_histogram!(
        format!("{}_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end query latency in seconds"
    );

    describe_gauge!(
        format!("{}_query_results_count", METRICS_PREFIX),
        Unit::Count,
        "Documents selected into context per query"
    );

    // Ingestion metrics
    describe_counter!(
        format!("{}_documents_ingested_total", METRICS_PREFIX),
        Unit::Count,
        "Total documents stored by sync runs"
    );

    describe_counter!(
        format!("{}_documents_skipped_total", METRICS_PREFIX),
        Unit::Count,
        "Documents skipped as duplicates"
    );

    describe_histogram!(
        format!("{}_sync_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Sync run duration in seconds"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embeddings_generated_total", METRICS_PREFIX),
        Unit::Count,
        "Total embeddings written"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding chunk failures"
    );

    describe_histogram!(
        format!("{}_embedding_batch_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding batch duration in seconds"
    );
}

/// Record a completed query
pub fn record_query(duration_secs: f64, intent: &str, selected: usize) {
    counter!(format!("{}_queries_total", METRICS_PREFIX), "intent" => intent.to_string())
        .increment(1);
    histogram!(format!("{}_query_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    gauge!(format!("{}_query_results_count", METRICS_PREFIX)).set(selected as f64);
}

/// Record a completed sync run
pub fn record_sync(duration_secs: f64, source: &str, stored: u64, skipped: u64) {
    counter!(format!("{}_documents_ingested_total", METRICS_PREFIX), "source" => source.to_string())
        .increment(stored);
    counter!(format!("{}_documents_skipped_total", METRICS_PREFIX), "source" => source.to_string())
        .increment(skipped);
    histogram!(format!("{}_sync_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Record an embedding batch
pub fn record_embedding_batch(duration_secs: f64, embedded: u64, failed_chunks: u64) {
    counter!(format!("{}_embeddings_generated_total", METRICS_PREFIX)).increment(embedded);
    counter!(format!("{}_embedding_errors_total", METRICS_PREFIX)).increment(failed_chunks);
    histogram!(format!("{}_embedding_batch_duration_seconds", METRICS_PREFIX))
        .record(duration_secs);
}
