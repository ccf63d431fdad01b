use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Record;

/// Captured or uploaded microscopy image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Image {
    pub id: i64,
    pub name: String,
    pub patient: String,
    pub width: u32,
    pub height: u32,
    /// MIME-like type, e.g. `image/png`.
    pub file_type: String,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub data: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewImage {
    pub name: String,
    pub patient: String,
    pub width: u32,
    pub height: u32,
    pub file_type: String,
    pub data: Vec<u8>,
}

impl Record for Image {
    type Draft = NewImage;

    fn id(&self) -> i64 {
        self.id
    }

    fn from_draft(id: i64, now: DateTime<Utc>, draft: NewImage) -> Self {
        Self {
            id,
            name: draft.name,
            patient: draft.patient,
            width: draft.width,
            height: draft.height,
            file_type: draft.file_type,
            data: draft.data,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
