//! Gallery photos.

use serde::{Deserialize, Serialize};
use smartcam_core::types::{DbId, Timestamp};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Photo {
    pub id: DbId,
    pub filename: String,
    pub filepath: String,
    pub quality: i32,
    pub flash_used: bool,
    pub flash_intensity: i32,
    pub created_at: Timestamp,
}

/// DTO for inserting a photo row after the file has been written.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePhoto {
    pub filename: String,
    pub filepath: String,
    pub quality: i32,
    pub flash_used: bool,
    pub flash_intensity: i32,
}
