use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub mod health;
pub mod images;
pub mod jobs;
pub mod metrics;
pub mod results;

/// Build the HTTP surface around a running coordinator.
pub fn router(state: AppState, prometheus: Arc<PrometheusHandle>, body_limit: usize) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/images", post(images::upload_image))
        .route("/api/v1/images/{image_id}", get(images::get_image))
        .route("/api/v1/jobs", get(jobs::list_jobs).post(jobs::schedule_job))
        .route("/api/v1/jobs/{job_id}", get(jobs::get_job).delete(jobs::delete_job))
        .route("/api/v1/results/{result_id}", get(results::get_result))
        .with_state(state)
        .route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state(prometheus),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
}
