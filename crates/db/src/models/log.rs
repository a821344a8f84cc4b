//! System and device log lines.

use serde::{Deserialize, Serialize};
use smartcam_core::types::{DbId, Timestamp};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LogEntry {
    pub id: DbId,
    pub message: String,
    pub log_type: String,
    pub source: Option<String>,
    pub created_at: Timestamp,
}

/// Query filter for [`crate::repositories::LogRepo::list`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogFilter {
    pub source: Option<String>,
    pub level: Option<String>,
    pub limit: i64,
}
