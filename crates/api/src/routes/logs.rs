use axum::routing::get;
use axum::Router;

use crate::handlers::logs;
use crate::state::AppState;

/// Routes mounted at `/logs`.
///
/// ```text
/// GET /    -> list (?limit, ?source, ?level)
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(logs::list))
}
