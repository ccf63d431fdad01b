use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::result::BoundingBox;

/// Metadata fields of an image upload.
#[derive(Debug, Deserialize, Validate)]
pub struct UploadImageRequest {
    #[garde(length(min = 1, max = 200))]
    pub name: String,

    #[garde(length(max = 200))]
    pub patient: String,
}

/// Response after storing an uploaded image.
#[derive(Debug, Serialize)]
pub struct UploadImageResponse {
    pub image_id: i64,
    pub width: u32,
    pub height: u32,
    pub file_type: String,
}

/// Request to enqueue analysis of a stored image.
#[derive(Debug, Deserialize, Validate)]
pub struct ScheduleJobRequest {
    #[garde(range(min = 1))]
    pub image_id: i64,
}

/// Response for querying a finished job's result.
#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub result_id: i64,
    pub job_id: i64,
    pub detections: Vec<BoundingBox>,
    /// Processed image, base64-encoded.
    pub image: String,
}
