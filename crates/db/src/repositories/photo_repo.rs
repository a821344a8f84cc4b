//! Repository for the `photos` table.

use sqlx::SqlitePool;

use crate::models::photo::{CreatePhoto, Photo};

const COLUMNS: &str = "id, filename, filepath, quality, flash_used, flash_intensity, created_at";

pub struct PhotoRepo;

impl PhotoRepo {
    pub async fn insert(pool: &SqlitePool, input: &CreatePhoto) -> Result<Photo, sqlx::Error> {
        let query = format!(
            "INSERT INTO photos (filename, filepath, quality, flash_used, flash_intensity)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Photo>(&query)
            .bind(&input.filename)
            .bind(&input.filepath)
            .bind(input.quality)
            .bind(input.flash_used)
            .bind(input.flash_intensity)
            .fetch_one(pool)
            .await
    }

    /// One page of photos, newest first.
    pub async fn list(pool: &SqlitePool, limit: i64, offset: i64) -> Result<Vec<Photo>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM photos
             ORDER BY created_at DESC, id DESC
             LIMIT ?1 OFFSET ?2"
        );
        sqlx::query_as::<_, Photo>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM photos")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    pub async fn find_by_filename(
        pool: &SqlitePool,
        filename: &str,
    ) -> Result<Option<Photo>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM photos WHERE filename = ?1");
        sqlx::query_as::<_, Photo>(&query)
            .bind(filename)
            .fetch_optional(pool)
            .await
    }

    /// Returns `true` if a row was deleted.
    pub async fn delete_by_filename(pool: &SqlitePool, filename: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM photos WHERE filename = ?1")
            .bind(filename)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
