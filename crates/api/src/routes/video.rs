use axum::routing::{get, post};
use axum::Router;

use crate::handlers::video;
use crate::state::AppState;

/// Routes mounted at `/video`.
///
/// ```text
/// POST /frame    -> upload_frame (device token)
/// GET  /frame    -> latest_frame
/// GET  /latest   -> latest_frame
/// GET  /feed     -> feed (multipart/x-mixed-replace)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/frame", post(video::upload_frame).get(video::latest_frame))
        .route("/latest", get(video::latest_frame))
        .route("/feed", get(video::feed))
}
