use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;

use crate::store::Stores;

pub mod images;
pub mod jobs;
pub mod results;

pub use images::PgImageRepository;
pub use jobs::PgJobRepository;
pub use results::PgResultRepository;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Repositories backed by one shared pool.
pub fn stores(pool: PgPool) -> Stores {
    Stores {
        jobs: Arc::new(PgJobRepository::new(pool.clone())),
        images: Arc::new(PgImageRepository::new(pool.clone())),
        results: Arc::new(PgResultRepository::new(pool)),
    }
}
