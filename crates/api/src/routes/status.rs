//! Route definitions for `/status` and the socket registry views.

use axum::routing::get;
use axum::Router;

use crate::handlers::status;
use crate::state::AppState;

/// Routes mounted at `/status`.
///
/// ```text
/// GET /    -> get_status
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(status::get_status))
}

/// Routes mounted at `/ws` under `/api/v1`.
///
/// ```text
/// GET /stats               -> ws_stats
/// GET /connections/{id}    -> ws_connection
/// ```
pub fn ws_router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(status::ws_stats))
        .route("/connections/{id}", get(status::ws_connection))
}
