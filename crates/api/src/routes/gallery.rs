use axum::routing::get;
use axum::Router;

use crate::handlers::gallery;
use crate::state::AppState;

/// Routes mounted at `/gallery`.
///
/// ```text
/// GET    /              -> list (?page, ?limit)
/// GET    /count         -> count
/// GET    /videos              -> list_videos (?page, ?limit)
/// GET    /videos/{filename}   -> serve_video
/// DELETE /videos/{filename}   -> delete_video
/// GET    /{filename}    -> serve_photo
/// DELETE /{filename}    -> delete
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(gallery::list))
        .route("/count", get(gallery::count))
        .route("/videos", get(gallery::list_videos))
        .route(
            "/videos/{filename}",
            get(gallery::serve_video).delete(gallery::delete_video),
        )
        .route(
            "/{filename}",
            get(gallery::serve_photo).delete(gallery::delete),
        )
}
