//! Route definitions for `/ports`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::ports;
use crate::state::AppState;

/// Routes mounted at `/ports`.
///
/// ```text
/// GET  /state      -> get_state
/// GET  /free       -> free_ports
/// GET  /used       -> used_ports
/// POST /pick       -> pick (admin)
/// POST /release    -> release (admin)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/state", get(ports::get_state))
        .route("/free", get(ports::free_ports))
        .route("/used", get(ports::used_ports))
        .route("/pick", post(ports::pick))
        .route("/release", post(ports::release))
}
