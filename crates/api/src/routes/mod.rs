pub mod auth;
pub mod control;
pub mod gallery;
pub mod health;
pub mod logs;
pub mod ports;
pub mod settings;
pub mod status;
pub mod video;

use axum::routing::get;
use axum::Router;

use crate::devices::esp32cam::esp32cam_ws_handler;
use crate::devices::pico::pico_ws_handler;
use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /auth/login                         login (public)
/// /auth/logout                        logout
/// /auth/me                            current user
///
/// /control/servo                      pan/tilt command (POST)
/// /control/action                     whitelisted device action (POST)
/// /control/photo                      manual photo request (POST)
///
/// /video/frame                        frame upload (ESP32CAM token, POST),
///                                     latest frame as JPEG (GET)
/// /video/latest                       latest frame as JPEG
/// /video/feed                         MJPEG stream
///
/// /status                             system snapshot
/// /ws/stats                           socket registry counters
/// /ws/connections/{id}                one dashboard connection
///
/// /ports/state                        persisted port state
/// /ports/free                         scan for free ports
/// /ports/used                         ports marked used
/// /ports/pick                         pick a port (admin, POST)
/// /ports/release                      release current port (admin, POST)
///
/// /gallery                            paged photo list
/// /gallery/count                      photo count
/// /gallery/{filename}                 serve, delete
/// /gallery/videos                     paged security video list
/// /gallery/videos/{filename}          stream, delete
///
/// /logs                               filtered log lines
///
/// /settings                           get, update
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/control", control::router())
        .nest("/video", video::router())
        .nest("/status", status::router())
        .nest("/ws", status::ws_router())
        .nest("/ports", ports::router())
        .nest("/gallery", gallery::router())
        .nest("/logs", logs::router())
        .nest("/settings", settings::router())
}

/// WebSocket endpoints, mounted at the root outside the HTTP rate limiter.
///
/// ```text
/// /ws                 dashboard clients (token in first message)
/// /ws/pico            Pico controller (device token header)
/// /ws/esp32cam        ESP32-CAM (device token header)
/// ```
pub fn ws_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/ws/pico", get(pico_ws_handler))
        .route("/ws/esp32cam", get(esp32cam_ws_handler))
}
