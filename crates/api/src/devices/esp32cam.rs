//! ESP32CAM session at `/ws/esp32cam`.
//!
//! Binary messages are JPEG frames; text messages report photo results,
//! firmware logs and errors.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use smartcam_core::device::{ClientKind, DeviceKind};
use smartcam_core::frames::FrameError;
use smartcam_core::protocol::{parse_inbound, CameraInbound, ServerMessage};
use smartcam_db::models::photo::CreatePhoto;
use smartcam_db::repositories::PhotoRepo;
use tokio::sync::mpsc;

use super::{authenticate_device, persist_log, reject_socket};
use crate::error::{AppError, AppResult};
use crate::gallery;
use crate::middleware::client_ip::ClientIp;
use crate::state::AppState;
use crate::ws::text_frame;

/// Silence on the socket before the server pings.
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(60);

const FRAME_LOG_EVERY: u64 = 100;

/// Upgrade `/ws/esp32cam`.
pub async fn esp32cam_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    client_ip: ClientIp,
    headers: HeaderMap,
) -> impl IntoResponse {
    let auth = authenticate_device(
        DeviceKind::Esp32Cam,
        &headers,
        &client_ip,
        &state.config.devices,
    );
    let max_frame = state.config.frames.max_frame_size;
    ws.max_message_size(max_frame.saturating_mul(2))
        .on_upgrade(move |socket| async move {
            match auth {
                Ok(()) => run_session(socket, state, client_ip.0).await,
                Err(err) => reject_socket(socket, DeviceKind::Esp32Cam, err).await,
            }
        })
}

async fn run_session(socket: WebSocket, state: AppState, addr: String) {
    let session_id = uuid::Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let (mut sink, mut stream) = socket.split();

    state.devices.camera.attach(&session_id, tx.clone(), &addr);
    tracing::info!(session_id = %session_id, addr = %addr, "ESP32CAM connected");
    persist_log(&state.pool, &format!("ESP32CAM connected from {addr}"), "info", "esp32cam").await;

    let sender_session = session_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(session_id = %sender_session, "ESP32CAM sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let _ = tx.send(text_frame(&ServerMessage::connection_ack("ESP32CAM connected")));

    let mut frames_received: u64 = 0;
    loop {
        let next = match tokio::time::timeout(RECEIVE_TIMEOUT, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                tracing::debug!(session_id = %session_id, "ESP32CAM quiet, sending ping");
                let _ = tx.send(text_frame(&ServerMessage::ping()));
                continue;
            }
        };

        match next {
            Some(Ok(Message::Binary(data))) => {
                state.devices.camera.mark_seen();
                if handle_frame(&state, data).await {
                    frames_received += 1;
                    if frames_received % FRAME_LOG_EVERY == 0 {
                        tracing::info!(session_id = %session_id, count = frames_received, "ESP32CAM frames received");
                    }
                }
            }
            Some(Ok(Message::Text(text))) => {
                state.devices.camera.mark_seen();
                if let Some(reply) = handle_text(&state, &session_id, text.as_str()).await {
                    let _ = tx.send(text_frame(&reply));
                }
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => state.devices.camera.mark_seen(),
            Some(Ok(Message::Close(frame))) => {
                tracing::debug!(session_id = %session_id, ?frame, "ESP32CAM sent close");
                break;
            }
            Some(Err(e)) => {
                tracing::debug!(session_id = %session_id, error = %e, "ESP32CAM receive error");
                break;
            }
            None => break,
        }
    }

    send_task.abort();
    if state.devices.camera.detach(&session_id) {
        persist_log(&state.pool, "ESP32CAM disconnected", "info", "esp32cam").await;
    }
    tracing::info!(session_id = %session_id, frames = frames_received, "ESP32CAM disconnected");
}

/// Store a binary frame and fan it out to dashboards. Returns `true` when
/// the frame was accepted.
async fn handle_frame(state: &AppState, data: Bytes) -> bool {
    if data.is_empty() {
        return false;
    }
    let size = data.len();
    let accepted = state.frames().accept(data.clone());

    match accepted {
        Ok(_) => {
            broadcast_frame(state, &data).await;
            true
        }
        Err(err @ FrameError::TooLarge { .. }) => {
            tracing::warn!(size, error = %err, "Dropped oversized frame");
            false
        }
        Err(err) => {
            tracing::warn!(size, error = %err, "Rejected invalid frame");
            state.devices.camera.record_error(err.to_string());
            false
        }
    }
}

/// Send a frame to every dashboard connection as base64.
pub(crate) async fn broadcast_frame(state: &AppState, data: &[u8]) {
    let message = ServerMessage::Frame {
        data: base64::engine::general_purpose::STANDARD.encode(data),
        size: data.len(),
        timestamp: chrono::Utc::now(),
    };
    state
        .ws_manager
        .broadcast(text_frame(&message), Some(ClientKind::Web), None)
        .await;
}

async fn handle_text(state: &AppState, session_id: &str, text: &str) -> Option<ServerMessage> {
    let message = match parse_inbound::<CameraInbound>(text) {
        Ok(message) => message,
        Err(err) => {
            tracing::debug!(session_id, error = %err, "Bad ESP32CAM message");
            return Some(ServerMessage::error(err.to_string()));
        }
    };

    match message {
        CameraInbound::PhotoSent { size } => {
            tracing::info!(session_id, size, "ESP32CAM reported photo sent");
            if let Err(e) = save_manual_photo(state).await {
                tracing::error!(session_id, error = %e, "Failed to save manual photo");
                state.devices.camera.record_error(format!("Photo save failed: {e}"));
                return Some(ServerMessage::error("Failed to save photo"));
            }
            None
        }
        CameraInbound::PhotoError { message } => {
            let message = message.unwrap_or_else(|| "Unknown photo error".to_string());
            tracing::warn!(session_id, error = %message, "ESP32CAM photo error");
            state.devices.camera.record_error(format!("Photo error: {message}"));
            persist_log(&state.pool, &format!("Photo error: {message}"), "error", "esp32cam").await;
            None
        }
        CameraInbound::SystemError { message } => {
            tracing::warn!(session_id, error = %message, "ESP32CAM system error");
            state.devices.camera.record_error(message.clone());
            persist_log(&state.pool, &message, "error", "esp32cam").await;
            None
        }
        CameraInbound::Log { message, level } => {
            tracing::debug!(session_id, level = %level, message = %message, "ESP32CAM log");
            persist_log(&state.pool, &message, &level, "esp32cam").await;
            None
        }
        CameraInbound::Pong => None,
    }
}

/// Persist the latest frame as a gallery photo and announce it.
async fn save_manual_photo(state: &AppState) -> AppResult<()> {
    let frame = state
        .frames()
        .latest()
        .ok_or_else(|| AppError::BadRequest("No frame available to save".into()))?;
    let request = state.devices.take_pending_photo().unwrap_or_default();

    let (filename, path) =
        gallery::store_manual_photo(&state.config.gallery_dir, chrono::Utc::now(), &frame)
            .await
            .map_err(|e| AppError::InternalError(format!("Failed to write photo: {e}")))?;

    PhotoRepo::insert(
        &state.pool,
        &CreatePhoto {
            filename: filename.clone(),
            filepath: path.display().to_string(),
            quality: i32::from(request.quality),
            flash_used: request.flash,
            flash_intensity: i32::from(request.intensity),
        },
    )
    .await?;

    persist_log(
        &state.pool,
        &format!("Manual photo saved from ESP32CAM: {filename}"),
        "info",
        "esp32cam",
    )
    .await;

    let announcement = ServerMessage::PhotoCaptured {
        url: gallery::photo_url(&filename),
        filename,
        quality: request.quality,
        flash_used: request.flash,
        intensity: request.intensity,
        timestamp: chrono::Utc::now(),
    };
    state
        .ws_manager
        .broadcast(text_frame(&announcement), Some(ClientKind::Web), None)
        .await;
    Ok(())
}
