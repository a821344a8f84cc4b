//! Route definitions for `/control`.

use axum::routing::post;
use axum::Router;

use crate::handlers::control;
use crate::state::AppState;

/// Routes mounted at `/control`.
///
/// ```text
/// POST /servo    -> servo
/// POST /action   -> action
/// POST /photo    -> photo
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/servo", post(control::servo))
        .route("/action", post(control::action))
        .route("/photo", post(control::photo))
}
