//! Handlers for `/video` (frame upload, latest frame, MJPEG feed).

use std::convert::Infallible;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{self, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use smartcam_core::device::DeviceKind;
use smartcam_core::error::CoreError;

use crate::devices::authenticate_device;
use crate::devices::esp32cam::broadcast_frame;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::client_ip::ClientIp;
use crate::state::AppState;

/// Interval between MJPEG parts (about 30 fps).
const FEED_INTERVAL: Duration = Duration::from_millis(33);

const MJPEG_BOUNDARY: &str = "frame";

/// POST /api/v1/video/frame
///
/// Raw JPEG body from the camera, authenticated with its device token.
/// Frames arriving faster than the pacing interval are skipped.
pub async fn upload_frame(
    State(state): State<AppState>,
    client_ip: ClientIp,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    authenticate_device(DeviceKind::Esp32Cam, &headers, &client_ip, &state.config.devices)
        .map_err(|e| AppError::Core(CoreError::Unauthorized(e.to_string())))?;

    let size = body.len();
    let format = {
        let mut frames = state.frames();
        if !frames.admit_upload() {
            return Ok(Json(json!({ "status": "skipped", "size": size })));
        }
        frames
            .accept(body.clone())
            .map_err(|e| AppError::BadRequest(e.to_string()))?
    };
    state.devices.camera.mark_seen();

    broadcast_frame(&state, &body).await;
    Ok(Json(json!({ "status": "success", "size": size, "format": format })))
}

/// GET /api/v1/video/frame
///
/// The latest frame as `image/jpeg`; 503 when none has arrived yet.
pub async fn latest_frame(State(state): State<AppState>, _user: AuthUser) -> AppResult<Response> {
    let frame = state
        .frames()
        .latest()
        .ok_or_else(|| CoreError::Unavailable("No frame available".into()))?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        frame,
    )
        .into_response())
}

/// GET /api/v1/video/feed
///
/// `multipart/x-mixed-replace` stream of the latest frame. The stream ends
/// when the server shuts down.
pub async fn feed(State(state): State<AppState>, user: AuthUser) -> Response {
    tracing::info!(user_id = user.user_id, "MJPEG feed opened");

    let mut interval = tokio::time::interval(FEED_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let stream = futures::stream::unfold(
        (state, interval, 0u64),
        |(state, mut interval, mut last_count)| async move {
            loop {
                tokio::select! {
                    () = state.shutdown.cancelled() => {
                        tracing::debug!("MJPEG feed closed for shutdown");
                        return None;
                    }
                    _ = interval.tick() => {}
                }
                let (frame, count) = {
                    let frames = state.frames();
                    (frames.latest(), frames.stats().frame_count)
                };
                let Some(frame) = frame else { continue };
                if count == last_count {
                    continue;
                }
                last_count = count;
                let part = mjpeg_part(&frame);
                return Some((Ok::<_, Infallible>(part), (state, interval, last_count)));
            }
        },
    );

    (
        [(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace;boundary={MJPEG_BOUNDARY}"),
        )],
        Body::from_stream(stream),
    )
        .into_response()
}

fn mjpeg_part(frame: &[u8]) -> Bytes {
    let head = format!(
        "--{MJPEG_BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        frame.len()
    );
    let mut part = Vec::with_capacity(head.len() + frame.len() + 2);
    part.extend_from_slice(head.as_bytes());
    part.extend_from_slice(frame);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}
