//! Security video clips.

use serde::{Deserialize, Serialize};
use smartcam_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// Clip length assumed when the recorder does not report one.
pub const DEFAULT_VIDEO_DURATION_SECS: i32 = 3600;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Video {
    pub id: DbId,
    pub filename: String,
    pub filepath: String,
    /// Hour of day the recording started, `0..=23`.
    pub hour_of_day: i32,
    pub duration: i32,
    pub size_bytes: i64,
    pub created_at: Timestamp,
}

/// DTO for indexing a clip found on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateVideo {
    pub filename: String,
    pub filepath: String,
    pub hour_of_day: i32,
    pub duration: i32,
    pub size_bytes: i64,
    pub created_at: Timestamp,
}
