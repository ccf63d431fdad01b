//! Persistence contract consumed by the job queue.
//!
//! Every entity (job, image, result) is stored in its own repository keyed
//! by an auto-incrementing id. Rows carry created/updated timestamps that
//! the repository owns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::models::{image::Image, job::Job, result::ResultRecord};

pub mod memory;

/// A row type that can be stored in a [`Repository`].
pub trait Record: Clone + Send + Sync + 'static {
    /// Payload accepted by `create`, without id or timestamps.
    type Draft: Send + 'static;

    fn id(&self) -> i64;

    fn from_draft(id: i64, now: DateTime<Utc>, draft: Self::Draft) -> Self;

    /// Refresh `updated_at`.
    fn touch(&mut self, now: DateTime<Utc>);
}

#[async_trait]
pub trait Repository<R: Record>: Send + Sync {
    /// Insert a row, assigning id and timestamps.
    async fn create(&self, draft: R::Draft) -> Result<R, StoreError>;

    async fn read(&self, id: i64) -> Result<R, StoreError>;

    /// Replace the row with the same id and refresh `updated_at`.
    async fn update(&self, record: R) -> Result<R, StoreError>;

    async fn delete(&self, id: i64) -> Result<(), StoreError>;

    async fn read_all(&self) -> Result<Vec<R>, StoreError>;
}

pub type JobStore = dyn Repository<Job>;
pub type ImageStore = dyn Repository<Image>;
pub type ResultStore = dyn Repository<ResultRecord>;

/// The three repositories the coordinator and the host read and write.
#[derive(Clone)]
pub struct Stores {
    pub jobs: Arc<JobStore>,
    pub images: Arc<ImageStore>,
    pub results: Arc<ResultStore>,
}

impl Stores {
    /// Offline stores that live only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            jobs: Arc::new(memory::MemoryRepository::<Job>::new()),
            images: Arc::new(memory::MemoryRepository::<Image>::new()),
            results: Arc::new(memory::MemoryRepository::<ResultRecord>::new()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record {0} not found")]
    NotFound(i64),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid record: {0}")]
    Invalid(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
