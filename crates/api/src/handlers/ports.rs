//! Handlers for `/ports` (dynamic port manager).
//!
//! Scans bind real sockets, so they run on the blocking pool.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use smartcam_core::port_manager::{PortError, PortManager, PortState, DEFAULT_SCAN_COUNT};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

async fn blocking<T, F>(state: &AppState, f: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce(&PortManager) -> Result<T, PortError> + Send + 'static,
{
    let manager = state.port_manager.clone();
    tokio::task::spawn_blocking(move || f(&manager))
        .await
        .map_err(|e| AppError::InternalError(format!("Port task failed: {e}")))?
        .map_err(AppError::from)
}

#[derive(Debug, Serialize)]
pub struct PortStateResponse {
    #[serde(flatten)]
    pub state: PortState,
    pub state_file: String,
}

/// GET /api/v1/ports/state
pub async fn get_state(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Json<DataResponse<PortStateResponse>> {
    Json(DataResponse {
        data: PortStateResponse {
            state: state.port_manager.state(),
            state_file: state.port_manager.state_path().display().to_string(),
        },
    })
}

/// GET /api/v1/ports/free
///
/// Rescans the range and returns up to the default scan count of free ports.
pub async fn free_ports(
    State(state): State<AppState>,
    _user: AuthUser,
) -> AppResult<Json<DataResponse<Value>>> {
    let free = blocking(&state, |m| m.find_free_ports(DEFAULT_SCAN_COUNT)).await?;
    Ok(Json(DataResponse {
        data: json!({ "count": free.len(), "free_ports": free }),
    }))
}

/// GET /api/v1/ports/used
pub async fn used_ports(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Json<DataResponse<Value>> {
    let used = state.port_manager.state().used;
    Json(DataResponse {
        data: json!({ "count": used.len(), "used_ports": used }),
    })
}

/// POST /api/v1/ports/pick (admin)
pub async fn pick(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> AppResult<Json<DataResponse<Value>>> {
    let port = blocking(&state, |m| m.pick_port()).await?;
    tracing::info!(port, user_id = admin.user_id, "Port picked via API");
    Ok(Json(DataResponse {
        data: json!({ "port": port }),
    }))
}

/// POST /api/v1/ports/release (admin)
pub async fn release(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> AppResult<Json<DataResponse<Value>>> {
    let released = blocking(&state, |m| m.release_port()).await?;
    tracing::info!(?released, user_id = admin.user_id, "Port released via API");
    Ok(Json(DataResponse {
        data: json!({ "released": released }),
    }))
}
