use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::models::api::ScheduleJobRequest;
use crate::models::job::{Job, QueueSnapshot};
use crate::queue::QueueError;
use crate::store::StoreError;

fn status_for(error: &QueueError) -> StatusCode {
    match error {
        QueueError::UnknownJob(_) | QueueError::Store(StoreError::NotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        QueueError::CoordinatorClosed | QueueError::Channel(_) => StatusCode::SERVICE_UNAVAILABLE,
        QueueError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// GET /api/v1/jobs — the latest snapshot known to the mirror.
pub async fn list_jobs(State(state): State<AppState>) -> Result<Json<QueueSnapshot>, StatusCode> {
    let mirror = state.mirror.read().await;
    let jobs = mirror.jobs().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(QueueSnapshot {
        jobs: jobs.to_vec(),
    }))
}

/// GET /api/v1/jobs/{job_id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> Result<Json<Job>, StatusCode> {
    let mirror = state.mirror.read().await;
    if !mirror.has_synced() {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    mirror
        .get(job_id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// POST /api/v1/jobs — enqueue analysis of a stored image.
pub async fn schedule_job(
    State(state): State<AppState>,
    Json(request): Json<ScheduleJobRequest>,
) -> Result<(StatusCode, Json<Job>), StatusCode> {
    request.validate().map_err(|e| {
        tracing::debug!(error = %e, "Rejected schedule request");
        StatusCode::UNPROCESSABLE_ENTITY
    })?;

    if !state.mirror.read().await.has_synced() {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let job = state.queue.schedule(request.image_id).await.map_err(|e| {
        tracing::warn!(image_id = request.image_id, error = %e, "Schedule request failed");
        status_for(&e)
    })?;

    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// DELETE /api/v1/jobs/{job_id} — removes the job from the mirror right away,
/// the next snapshot restores it if the coordinator refused.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> Result<StatusCode, StatusCode> {
    state.mirror.write().await.delete(job_id);

    state.queue.delete(job_id).await.map_err(|e| {
        tracing::warn!(job_id, error = %e, "Delete request failed");
        status_for(&e)
    })?;

    Ok(StatusCode::NO_CONTENT)
}
