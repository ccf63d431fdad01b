use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use micro_tracker::app_state::AppState;
use micro_tracker::config::AppConfig;
use micro_tracker::db;
use micro_tracker::queue::{self, mirror, ClientQueueMirror, JobQueueCoordinator};
use micro_tracker::routes;
use micro_tracker::store::Stores;
use micro_tracker::worker::{self, HttpDetector};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing micro-tracker");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe_metrics();

    // Durable store when configured, in-memory otherwise
    let stores = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to PostgreSQL database");
            let pool = db::init_pool(database_url)
                .await
                .expect("Failed to connect to database");

            tracing::info!("Running database migrations");
            db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");

            db::stores(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, jobs will not survive a restart");
            Stores::in_memory()
        }
    };

    // Start the compute worker on its own thread
    tracing::info!(inference_url = %config.inference_url, "Starting compute worker");
    let (worker_channel, worker_events, _worker_thread) =
        worker::spawn_worker(HttpDetector::new(&config.inference_url))
            .expect("Failed to start compute worker thread");

    // Start the coordinator and mirror its snapshots for the HTTP layer
    let coordinator = JobQueueCoordinator::new(stores.clone(), worker_channel)
        .with_lease(config.job_lease());
    let (queue_handle, _coordinator_task) =
        queue::spawn(coordinator, worker_events, config.coordinator_inbox);

    let shared_mirror = ClientQueueMirror::shared();
    mirror::follow(queue_handle.subscribe(), shared_mirror.clone());
    if let Err(e) = queue_handle.resync().await {
        tracing::error!(error = %e, "Initial resync request failed");
    }

    let state = AppState::new(queue_handle, shared_mirror, stores);
    let app = routes::router(state, prometheus_handle, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
