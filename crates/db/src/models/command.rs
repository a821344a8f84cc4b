//! Persisted control commands.

use serde::Serialize;
use smartcam_core::types::{DbId, Timestamp};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ServoCommandRow {
    pub id: DbId,
    pub servo1: i32,
    pub servo2: i32,
    pub processed: bool,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ActionCommandRow {
    pub id: DbId,
    pub action: String,
    pub intensity: i32,
    pub processed: bool,
    pub created_at: Timestamp,
}
