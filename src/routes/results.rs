use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use base64::Engine;

use crate::app_state::AppState;
use crate::models::api::ResultResponse;
use crate::store::StoreError;

/// GET /api/v1/results/{result_id} — detections and the processed image.
pub async fn get_result(
    State(state): State<AppState>,
    Path(result_id): Path<i64>,
) -> Result<Json<ResultResponse>, StatusCode> {
    let record = match state.stores.results.read(result_id).await {
        Ok(record) => record,
        Err(StoreError::NotFound(_)) => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!(result_id, error = %e, "Failed to read result");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    Ok(Json(ResultResponse {
        result_id: record.id,
        job_id: record.job_id,
        detections: record.detections,
        image: base64::engine::general_purpose::STANDARD.encode(&record.image),
    }))
}
