//! Command dispatch shared by the HTTP control endpoints and the dashboard
//! socket.

use smartcam_core::commands::{DeviceAction, ManualPhotoRequest, ServoCommand};
use smartcam_core::device::ClientKind;
use smartcam_core::error::CoreError;
use smartcam_core::protocol::{DeviceCommand, ServerMessage};
use smartcam_db::repositories::{CommandRepo, LogRepo};
use validator::Validate;

use crate::devices::DeviceError;
use crate::error::AppResult;
use crate::state::AppState;
use crate::ws::text_frame;

/// What happened to a command after it was persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Sent to the device.
    Delivered,
    /// Stored, but the device is offline.
    Queued,
}

impl DispatchOutcome {
    pub fn status(self) -> &'static str {
        match self {
            DispatchOutcome::Delivered => "success",
            DispatchOutcome::Queued => "warning",
        }
    }
}

async fn notify_web(state: &AppState, message: &ServerMessage) {
    state
        .ws_manager
        .broadcast(text_frame(message), Some(ClientKind::Web), None)
        .await;
}

/// Clamp, persist and relay a servo command to the Pico.
///
/// The camera gets a `servo_command_log` copy when it is online. Dashboards
/// are told the outcome either way.
pub async fn apply_servo(
    state: &AppState,
    command: ServoCommand,
    source: &'static str,
) -> AppResult<(ServoCommand, DispatchOutcome)> {
    let command = command.clamped();
    CommandRepo::insert_servo(&state.pool, command).await?;
    LogRepo::insert(
        &state.pool,
        &format!(
            "Servo command: X={}°, Y={}°",
            command.servo1, command.servo2
        ),
        "command",
        Some("system"),
    )
    .await?;

    let outcome = match state
        .devices
        .pico
        .send(text_frame(&ServerMessage::servo(command, source)))
    {
        Ok(()) => {
            if state.devices.camera.is_online() {
                let _ = state
                    .devices
                    .camera
                    .send(text_frame(&ServerMessage::servo_log(command)));
            }
            DispatchOutcome::Delivered
        }
        Err(DeviceError::Offline(_) | DeviceError::SendFailed(_)) => DispatchOutcome::Queued,
    };

    let message = match outcome {
        DispatchOutcome::Delivered => None,
        DispatchOutcome::Queued => Some("Pico not connected, command saved".to_string()),
    };
    notify_web(
        state,
        &ServerMessage::servo_response(outcome.status(), message, command),
    )
    .await;

    tracing::info!(
        servo1 = command.servo1,
        servo2 = command.servo2,
        source,
        outcome = outcome.status(),
        "Servo command processed"
    );
    Ok((command, outcome))
}

/// Persist and relay a whitelisted action to the camera.
pub async fn apply_action(
    state: &AppState,
    action: DeviceAction,
    intensity: u8,
) -> AppResult<DispatchOutcome> {
    CommandRepo::insert_action(&state.pool, action, intensity).await?;
    LogRepo::insert(
        &state.pool,
        &format!("Action command: {action} (intensity {intensity})"),
        "command",
        Some("system"),
    )
    .await?;

    let outcome = match state
        .devices
        .camera
        .send(axum::extract::ws::Message::text(
            DeviceCommand::action(action, intensity).to_json(),
        )) {
        Ok(()) => DispatchOutcome::Delivered,
        Err(_) => DispatchOutcome::Queued,
    };

    notify_web(
        state,
        &ServerMessage::action_response(outcome.status(), action, intensity),
    )
    .await;

    tracing::info!(action = %action, intensity, outcome = outcome.status(), "Action command processed");
    Ok(outcome)
}

/// Ask the camera for a manual photo. Fails with 503 when it is offline.
pub async fn request_photo(state: &AppState, request: ManualPhotoRequest) -> AppResult<()> {
    request.validate().map_err(CoreError::from)?;

    if !state.devices.camera.is_online() {
        return Err(CoreError::Unavailable("ESP32CAM not connected".into()).into());
    }

    state.devices.set_pending_photo(request.clone());
    state
        .devices
        .camera
        .send(axum::extract::ws::Message::text(
            DeviceCommand::capture_photo(&request).to_json(),
        ))?;

    LogRepo::insert(
        &state.pool,
        &format!(
            "Manual photo requested (quality {}, flash {})",
            request.quality, request.flash
        ),
        "command",
        Some("system"),
    )
    .await?;
    tracing::info!(quality = request.quality, flash = request.flash, "Manual photo requested");
    Ok(())
}
