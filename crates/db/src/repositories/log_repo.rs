//! Repository for the `logs` table.

use sqlx::SqlitePool;

use crate::models::log::{LogEntry, LogFilter};

const COLUMNS: &str = "id, message, log_type, source, created_at";

pub struct LogRepo;

impl LogRepo {
    pub async fn insert(
        pool: &SqlitePool,
        message: &str,
        log_type: &str,
        source: Option<&str>,
    ) -> Result<LogEntry, sqlx::Error> {
        let query = format!(
            "INSERT INTO logs (message, log_type, source)
             VALUES (?1, ?2, ?3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, LogEntry>(&query)
            .bind(message)
            .bind(log_type)
            .bind(source)
            .fetch_one(pool)
            .await
    }

    /// Newest entries first, optionally narrowed by source and level.
    pub async fn list(pool: &SqlitePool, filter: &LogFilter) -> Result<Vec<LogEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM logs
             WHERE (?1 IS NULL OR source = ?1)
               AND (?2 IS NULL OR log_type = ?2)
             ORDER BY id DESC
             LIMIT ?3"
        );
        sqlx::query_as::<_, LogEntry>(&query)
            .bind(&filter.source)
            .bind(&filter.level)
            .bind(filter.limit)
            .fetch_all(pool)
            .await
    }
}
