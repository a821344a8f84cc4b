//! Handlers for `/control` (servo, action, photo).
//!
//! Every endpoint is also held to a per-client sliding-window limit.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use smartcam_core::commands::{ActionRequest, ManualPhotoRequest, ServoCommand};
use smartcam_core::error::CoreError;

use crate::control::{self, DispatchOutcome};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::client_ip::ClientIp;
use crate::response::CommandResponse;
use crate::state::AppState;

fn check_control_limit(state: &AppState, client_ip: &ClientIp) -> AppResult<()> {
    if state.control_limiter.check(client_ip.as_str()) {
        Ok(())
    } else {
        Err(AppError::Core(CoreError::RateLimited(
            "Too many control commands".into(),
        )))
    }
}

/// POST /api/v1/control/servo
///
/// Returns 202 with `status: "warning"` when the Pico is offline; the
/// command is still stored.
pub async fn servo(
    State(state): State<AppState>,
    user: AuthUser,
    client_ip: ClientIp,
    Json(command): Json<ServoCommand>,
) -> AppResult<CommandResponse<Value>> {
    check_control_limit(&state, &client_ip)?;
    tracing::debug!(user_id = user.user_id, "Servo command requested");

    let (command, outcome) = control::apply_servo(&state, command, "web_interface").await?;
    let message = match outcome {
        DispatchOutcome::Delivered => "Servo command sent",
        DispatchOutcome::Queued => "Pico not connected, command saved",
    };

    Ok(CommandResponse::new(
        outcome,
        message,
        json!({ "command": command }),
    ))
}

/// POST /api/v1/control/action
pub async fn action(
    State(state): State<AppState>,
    user: AuthUser,
    client_ip: ClientIp,
    Json(input): Json<ActionRequest>,
) -> AppResult<CommandResponse<Value>> {
    check_control_limit(&state, &client_ip)?;
    let (action, intensity) = input.resolve()?;
    tracing::debug!(user_id = user.user_id, action = %action, "Action requested");

    let outcome = control::apply_action(&state, action, intensity).await?;
    let message = match outcome {
        DispatchOutcome::Delivered => "Action sent",
        DispatchOutcome::Queued => "ESP32CAM not connected, action saved",
    };

    Ok(CommandResponse::new(
        outcome,
        message,
        json!({ "action": action, "intensity": intensity }),
    ))
}

/// POST /api/v1/control/photo
///
/// 503 when the camera is offline.
pub async fn photo(
    State(state): State<AppState>,
    user: AuthUser,
    client_ip: ClientIp,
    Json(input): Json<ManualPhotoRequest>,
) -> AppResult<CommandResponse<ManualPhotoRequest>> {
    check_control_limit(&state, &client_ip)?;
    tracing::debug!(user_id = user.user_id, "Manual photo requested");

    control::request_photo(&state, input.clone()).await?;
    Ok(CommandResponse::new(
        DispatchOutcome::Delivered,
        "Photo capture requested",
        input,
    ))
}
