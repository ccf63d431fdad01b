use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use std::io::Cursor;

use crate::app_state::AppState;
use crate::models::api::{UploadImageRequest, UploadImageResponse};
use crate::models::image::{Image, NewImage};
use crate::store::StoreError;

/// POST /api/v1/images — store a captured or uploaded microscopy image.
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadImageResponse>), StatusCode> {
    let mut data: Option<Vec<u8>> = None;
    let mut name = String::new();
    let mut patient = String::new();

    while let Some(field) = multipart.next_field().await.map_err(|_| StatusCode::BAD_REQUEST)? {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some("image") => {
                let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                data = Some(bytes.to_vec());
            }
            Some("name") => name = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?,
            Some("patient") => {
                patient = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?
            }
            _ => {}
        }
    }

    let data = data.ok_or(StatusCode::BAD_REQUEST)?;
    let metadata = UploadImageRequest { name, patient };
    metadata
        .validate()
        .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;

    // Sniff the format and read dimensions from the header only
    let format = image::guess_format(&data).map_err(|_| StatusCode::UNSUPPORTED_MEDIA_TYPE)?;
    let (width, height) = image::ImageReader::with_format(Cursor::new(&data), format)
        .into_dimensions()
        .map_err(|_| StatusCode::UNSUPPORTED_MEDIA_TYPE)?;
    let file_type = format.to_mime_type().to_string();

    let image = state
        .stores
        .images
        .create(NewImage {
            name: metadata.name,
            patient: metadata.patient,
            width,
            height,
            file_type: file_type.clone(),
            data,
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to store image");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    tracing::info!(image_id = image.id, width, height, file_type = %file_type, "Image stored");

    Ok((
        StatusCode::CREATED,
        Json(UploadImageResponse {
            image_id: image.id,
            width,
            height,
            file_type,
        }),
    ))
}

/// GET /api/v1/images/{image_id} — image metadata without the pixel data.
pub async fn get_image(
    State(state): State<AppState>,
    Path(image_id): Path<i64>,
) -> Result<Json<Image>, StatusCode> {
    match state.stores.images.read(image_id).await {
        Ok(image) => Ok(Json(image)),
        Err(StoreError::NotFound(_)) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!(image_id, error = %e, "Failed to read image");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
