use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;

use crate::models::job::{Job, JobState, NewJob};
use crate::store::{Repository, StoreError};

const COLUMNS: &str = "id, image_id, state, result_id, created_at, updated_at";

pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    let state: String = row.try_get("state")?;
    let state = JobState::from_str(&state)
        .map_err(|_| StoreError::Unavailable(format!("unknown job state '{state}'")))?;

    Ok(Job {
        id: row.try_get("id")?,
        image_id: row.try_get("image_id")?,
        state,
        result: row.try_get("result_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl Repository<Job> for PgJobRepository {
    async fn create(&self, draft: NewJob) -> Result<Job, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO jobs (image_id, state) VALUES ($1, 'waiting') RETURNING {COLUMNS}"
        ))
        .bind(draft.image_id)
        .fetch_one(&self.pool)
        .await?;

        job_from_row(&row)
    }

    async fn read(&self, id: i64) -> Result<Job, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))?;

        job_from_row(&row)
    }

    async fn update(&self, job: Job) -> Result<Job, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE jobs
            SET state = $1, result_id = $2, updated_at = NOW()
            WHERE id = $3
            RETURNING {COLUMNS}
            "#
        ))
        .bind(job.state.to_string())
        .bind(job.result)
        .bind(job.id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(job.id))?;

        job_from_row(&row)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let done = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM jobs ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(job_from_row).collect()
    }
}
