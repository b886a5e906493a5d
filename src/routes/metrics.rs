use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Prometheus scrape endpoint, text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for every metric the service emits.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "enrichment_jobs_total",
        "Enrichment jobs accepted onto the queue"
    );
    metrics::describe_counter!(
        "enrichment_jobs_completed",
        "Enrichment jobs that wrote a result"
    );
    metrics::describe_counter!(
        "enrichment_jobs_failed",
        "Enrichment jobs that ended in the failed state"
    );
    metrics::describe_counter!(
        "enrichment_jobs_skipped",
        "Enrichment jobs that ended in the skipped state"
    );
    metrics::describe_histogram!(
        "enrichment_processing_seconds",
        "Wall time of one enrichment workflow run"
    );
    metrics::describe_gauge!(
        "enrichment_queue_depth",
        "Jobs waiting in the enrichment queue"
    );
}
