use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Record;

/// Axis-aligned detection rectangle in processed-image pixel space.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// Output of a finished job. Owned by the job and deleted with it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultRecord {
    pub id: i64,
    pub job_id: i64,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub image: Vec<u8>,
    pub detections: Vec<BoundingBox>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewResult {
    pub job_id: i64,
    pub image: Vec<u8>,
    pub detections: Vec<BoundingBox>,
}

impl Record for ResultRecord {
    type Draft = NewResult;

    fn id(&self) -> i64 {
        self.id
    }

    fn from_draft(id: i64, now: DateTime<Utc>, draft: NewResult) -> Self {
        Self {
            id,
            job_id: draft.job_id,
            image: draft.image,
            detections: draft.detections,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
