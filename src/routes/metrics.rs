use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Register descriptions for the queue metrics.
pub fn describe_metrics() {
    metrics::describe_counter!("jobs_scheduled_total", "Jobs created by schedule requests");
    metrics::describe_counter!("jobs_dispatched_total", "Jobs sent to the compute worker");
    metrics::describe_counter!("jobs_finished_total", "Jobs that produced a result");
    metrics::describe_counter!("jobs_failed_total", "Jobs moved to the error state");
    metrics::describe_counter!(
        "stale_worker_messages_total",
        "Worker messages discarded because their job was gone or no longer in flight"
    );
    metrics::describe_gauge!("queue_depth", "Jobs waiting or running");
}

/// GET /metrics — Prometheus text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
}
