use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::models::image::{Image, NewImage};
use crate::store::{Repository, StoreError};

const COLUMNS: &str = "id, name, patient, width, height, file_type, data, created_at, updated_at";

pub struct PgImageRepository {
    pool: PgPool,
}

impl PgImageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn image_from_row(row: &PgRow) -> Result<Image, StoreError> {
    let width: i32 = row.try_get("width")?;
    let height: i32 = row.try_get("height")?;

    Ok(Image {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        patient: row.try_get("patient")?,
        width: from_column("width", width)?,
        height: from_column("height", height)?,
        file_type: row.try_get("file_type")?,
        data: row.try_get("data")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Pixel dimensions are stored as `INTEGER`.
fn to_column(field: &str, value: u32) -> Result<i32, StoreError> {
    i32::try_from(value)
        .map_err(|_| StoreError::Invalid(format!("image {field} {value} exceeds the column range")))
}

fn from_column(field: &str, value: i32) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::Invalid(format!("image {field} {value} is negative")))
}

#[async_trait]
impl Repository<Image> for PgImageRepository {
    async fn create(&self, draft: NewImage) -> Result<Image, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO images (name, patient, width, height, file_type, data)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&draft.name)
        .bind(&draft.patient)
        .bind(to_column("width", draft.width)?)
        .bind(to_column("height", draft.height)?)
        .bind(&draft.file_type)
        .bind(&draft.data)
        .fetch_one(&self.pool)
        .await?;

        image_from_row(&row)
    }

    async fn read(&self, id: i64) -> Result<Image, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM images WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))?;

        image_from_row(&row)
    }

    async fn update(&self, image: Image) -> Result<Image, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE images
            SET name = $1, patient = $2, updated_at = NOW()
            WHERE id = $3
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&image.name)
        .bind(&image.patient)
        .bind(image.id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(image.id))?;

        image_from_row(&row)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let done = sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Image>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM images ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(image_from_row).collect()
    }
}
