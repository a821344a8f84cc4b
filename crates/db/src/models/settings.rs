//! Per-user dashboard preferences.

use serde::{Deserialize, Serialize};
use smartcam_core::types::{DbId, Timestamp};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserSettings {
    pub user_id: DbId,
    pub theme: String,
    pub language: String,
    pub servo1: i32,
    pub servo2: i32,
    pub photo_quality: i32,
    pub smart_motion: bool,
    pub smart_tracking: bool,
    pub stream_enabled: bool,
    pub updated_at: Timestamp,
}

/// Partial update. `None` keeps the stored value (or the column default on
/// first write).
#[derive(Debug, Default, Deserialize)]
pub struct UpdateSettings {
    pub theme: Option<String>,
    pub language: Option<String>,
    pub servo1: Option<i32>,
    pub servo2: Option<i32>,
    pub photo_quality: Option<i32>,
    pub smart_motion: Option<bool>,
    pub smart_tracking: Option<bool>,
    pub stream_enabled: Option<bool>,
}
