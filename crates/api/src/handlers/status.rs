//! System status and WebSocket registry inspection.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use smartcam_core::device::ClientKind;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;
use crate::ws::manager::ConnectionInfo;

/// Snapshot shared by `GET /status` and the dashboard socket's `status`
/// message.
pub async fn system_status(state: &AppState) -> Value {
    let ws_stats = state.ws_manager.stats().await;
    let frames = state.frames().stats();
    let devices = state.devices.status();
    let ports = state.port_manager.state();

    json!({
        "system_ready": true,
        "pico_connected": devices.pico.online,
        "esp32cam_connected": devices.esp32cam.online,
        "web_clients_count": ws_stats.by_kind.get(ClientKind::Web.as_str()).copied().unwrap_or(0),
        "devices": devices,
        "websocket": ws_stats,
        "frames": frames,
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "ports": {
            "current": ports.current,
            "free_count": ports.free.len(),
            "used_count": ports.used.len(),
            "last_checked": ports.last_checked,
        },
        "version": env!("CARGO_PKG_VERSION"),
    })
}

/// GET /api/v1/status
pub async fn get_status(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Json<DataResponse<Value>> {
    Json(DataResponse {
        data: system_status(&state).await,
    })
}

/// GET /api/v1/ws/stats
///
/// Dashboard registry counters plus device session state. Devices hold
/// their own slots and do not count toward the registry limit.
pub async fn ws_stats(State(state): State<AppState>, _user: AuthUser) -> Json<DataResponse<Value>> {
    let registry = state.ws_manager.stats().await;
    Json(DataResponse {
        data: json!({
            "registry": registry,
            "devices": {
                "pico": state.devices.pico.is_online(),
                "esp32cam": state.devices.camera.is_online(),
            },
            "sensor_samples": state.devices.sensor_count(),
        }),
    })
}

/// GET /api/v1/ws/connections/{id}
pub async fn ws_connection(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(conn_id): Path<String>,
) -> AppResult<Json<DataResponse<ConnectionInfo>>> {
    let info = state
        .ws_manager
        .connection_info(&conn_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Connection {conn_id} not found")))?;
    Ok(Json(DataResponse { data: info }))
}
