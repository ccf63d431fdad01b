use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub store: ComponentHealth,
    pub coordinator: ComponentHealth,
    pub queue_synced: bool,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

impl ComponentHealth {
    fn ok(latency_ms: Option<u64>) -> Self {
        Self {
            status: "ok".to_string(),
            latency_ms,
        }
    }

    fn error() -> Self {
        Self {
            status: "error".to_string(),
            latency_ms: None,
        }
    }
}

/// GET /health — store reachability and coordinator liveness.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();
    let store_check = match state.stores.jobs.read_all().await {
        Ok(_) => ComponentHealth::ok(Some(start.elapsed().as_millis() as u64)),
        Err(e) => {
            tracing::warn!(error = %e, "Health check: job store unreachable");
            ComponentHealth::error()
        }
    };

    let coordinator_check = if state.queue.is_closed() {
        ComponentHealth::error()
    } else {
        ComponentHealth::ok(None)
    };

    let queue_synced = state.mirror.read().await.has_synced();
    let all_healthy = store_check.status == "ok" && coordinator_check.status == "ok";
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            store: store_check,
            coordinator: coordinator_check,
            queue_synced,
        },
    };

    (status_code, Json(response))
}
