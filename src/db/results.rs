use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use crate::models::result::{BoundingBox, NewResult, ResultRecord};
use crate::store::{Repository, StoreError};

const COLUMNS: &str = "id, job_id, image, detections, created_at, updated_at";

pub struct PgResultRepository {
    pool: PgPool,
}

impl PgResultRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn result_from_row(row: &PgRow) -> Result<ResultRecord, StoreError> {
    let Json(detections): Json<Vec<BoundingBox>> = row.try_get("detections")?;

    Ok(ResultRecord {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        image: row.try_get("image")?,
        detections,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl Repository<ResultRecord> for PgResultRepository {
    async fn create(&self, draft: NewResult) -> Result<ResultRecord, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO results (job_id, image, detections)
            VALUES ($1, $2, $3)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(draft.job_id)
        .bind(&draft.image)
        .bind(Json(&draft.detections))
        .fetch_one(&self.pool)
        .await?;

        result_from_row(&row)
    }

    async fn read(&self, id: i64) -> Result<ResultRecord, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM results WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))?;

        result_from_row(&row)
    }

    async fn update(&self, record: ResultRecord) -> Result<ResultRecord, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE results
            SET image = $1, detections = $2, updated_at = NOW()
            WHERE id = $3
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&record.image)
        .bind(Json(&record.detections))
        .bind(record.id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(record.id))?;

        result_from_row(&row)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let done = sqlx::query("DELETE FROM results WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<ResultRecord>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM results ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(result_from_row).collect()
    }
}
