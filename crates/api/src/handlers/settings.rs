//! Handlers for `/settings` (per-user dashboard preferences).

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use smartcam_core::commands::{SERVO_MAX, SERVO_MIN};
use smartcam_core::error::CoreError;
use smartcam_db::models::settings::{UpdateSettings, UserSettings};
use smartcam_db::repositories::SettingsRepo;
use validator::{Validate, ValidationError};

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

const THEMES: &[&str] = &["light", "dark"];
const LANGUAGES: &[&str] = &["fa", "en"];

fn validate_theme(theme: &str) -> Result<(), ValidationError> {
    if THEMES.contains(&theme) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_theme"))
    }
}

fn validate_language(language: &str) -> Result<(), ValidationError> {
    if LANGUAGES.contains(&language) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_language"))
    }
}

/// Request body for `PUT /settings`. Omitted fields keep their value.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct SettingsRequest {
    #[validate(custom(function = "validate_theme"))]
    pub theme: Option<String>,
    #[validate(custom(function = "validate_language"))]
    pub language: Option<String>,
    #[validate(range(min = SERVO_MIN, max = SERVO_MAX))]
    pub servo1: Option<i32>,
    #[validate(range(min = SERVO_MIN, max = SERVO_MAX))]
    pub servo2: Option<i32>,
    #[validate(range(min = 1, max = 100))]
    pub photo_quality: Option<i32>,
    pub smart_motion: Option<bool>,
    pub smart_tracking: Option<bool>,
    pub stream_enabled: Option<bool>,
}

impl From<SettingsRequest> for UpdateSettings {
    fn from(req: SettingsRequest) -> Self {
        Self {
            theme: req.theme,
            language: req.language,
            servo1: req.servo1,
            servo2: req.servo2,
            photo_quality: req.photo_quality,
            smart_motion: req.smart_motion,
            smart_tracking: req.smart_tracking,
            stream_enabled: req.stream_enabled,
        }
    }
}

/// GET /api/v1/settings
///
/// First read creates the row with column defaults.
pub async fn get_settings(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<DataResponse<UserSettings>>> {
    let settings = match SettingsRepo::get(&state.pool, user.user_id).await? {
        Some(settings) => settings,
        None => SettingsRepo::upsert(&state.pool, user.user_id, &UpdateSettings::default()).await?,
    };
    Ok(Json(DataResponse { data: settings }))
}

/// PUT /api/v1/settings
pub async fn update_settings(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<SettingsRequest>,
) -> AppResult<Json<DataResponse<UserSettings>>> {
    input.validate().map_err(CoreError::from)?;
    let settings = SettingsRepo::upsert(&state.pool, user.user_id, &input.into()).await?;
    tracing::debug!(user_id = user.user_id, "Settings updated");
    Ok(Json(DataResponse { data: settings }))
}
