//! Handlers for `/logs`.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use smartcam_db::models::log::{LogEntry, LogFilter};
use smartcam_db::repositories::LogRepo;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub limit: Option<i64>,
    pub source: Option<String>,
    pub level: Option<String>,
}

/// GET /api/v1/logs?limit=50&source=pico&level=error
///
/// Newest first. Empty filter values are ignored.
pub async fn list(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<LogQuery>,
) -> AppResult<Json<DataResponse<Vec<LogEntry>>>> {
    let filter = LogFilter {
        source: params.source.filter(|s| !s.trim().is_empty()),
        level: params.level.filter(|s| !s.trim().is_empty()),
        limit: params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
    };
    let entries = LogRepo::list(&state.pool, &filter).await?;
    Ok(Json(DataResponse { data: entries }))
}
