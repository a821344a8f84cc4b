//! Repository for the `security_videos` table.

use sqlx::SqlitePool;

use crate::models::video::{CreateVideo, Video};

const COLUMNS: &str = "id, filename, filepath, hour_of_day, duration, size_bytes, created_at";

pub struct VideoRepo;

impl VideoRepo {
    /// Index a clip. Returns `None` when the filename is already indexed.
    pub async fn insert(pool: &SqlitePool, input: &CreateVideo) -> Result<Option<Video>, sqlx::Error> {
        let query = format!(
            "INSERT INTO security_videos (filename, filepath, hour_of_day, duration, size_bytes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(filename) DO NOTHING
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Video>(&query)
            .bind(&input.filename)
            .bind(&input.filepath)
            .bind(input.hour_of_day)
            .bind(input.duration)
            .bind(input.size_bytes)
            .bind(input.created_at)
            .fetch_optional(pool)
            .await
    }

    /// One page of clips, newest first.
    pub async fn list(pool: &SqlitePool, limit: i64, offset: i64) -> Result<Vec<Video>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM security_videos
             ORDER BY created_at DESC, id DESC
             LIMIT ?1 OFFSET ?2"
        );
        sqlx::query_as::<_, Video>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM security_videos")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    pub async fn filenames(pool: &SqlitePool) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT filename FROM security_videos")
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    pub async fn find_by_filename(
        pool: &SqlitePool,
        filename: &str,
    ) -> Result<Option<Video>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM security_videos WHERE filename = ?1");
        sqlx::query_as::<_, Video>(&query)
            .bind(filename)
            .fetch_optional(pool)
            .await
    }

    /// Returns `true` if a row was deleted.
    pub async fn delete_by_filename(pool: &SqlitePool, filename: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM security_videos WHERE filename = ?1")
            .bind(filename)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
