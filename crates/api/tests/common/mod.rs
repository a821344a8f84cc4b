#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use smartcam_core::device::DeviceTokens;
use smartcam_core::frames::FrameConfig;
use smartcam_core::port_manager::{PortManager, PortProbe};
use smartcam_db::models::user::{CreateUser, User};
use smartcam_db::repositories::UserRepo;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::ServiceExt;

use smartcam_api::auth::jwt::{generate_access_token, JwtConfig};
use smartcam_api::auth::password::hash_password;
use smartcam_api::config::{DeviceConfig, PortConfig, ServerConfig, WsLimits};
use smartcam_api::router::build_app_router;
use smartcam_api::state::AppState;

pub const TEST_PASSWORD: &str = "camera_pass_2024";
pub const PICO_TOKEN: &str = "pico-test-token";
pub const CAMERA_TOKEN: &str = "cam-test-token";

/// Address every helper request claims to come from.
pub const CLIENT_IP: &str = "203.0.113.7";

/// Port probe that reports every port at or above `busy_from` as taken.
pub struct FakeProbe {
    pub busy_from: u16,
}

impl PortProbe for FakeProbe {
    fn is_free(&self, port: u16) -> bool {
        port < self.busy_from
    }
}

/// Build a test `ServerConfig` rooted in `dir`.
///
/// Loopback clients are not exempt from HTTP limits so rate-limit tests can
/// drive the limiter with the fixed [`CLIENT_IP`].
pub fn test_config(dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: Some(0),
        database_url: "sqlite::memory:".to_string(),
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough".to_string(),
            access_token_expiry_mins: 60,
            max_token_age_hours: 1,
        },
        devices: DeviceConfig {
            tokens: DeviceTokens::new([PICO_TOKEN], [CAMERA_TOKEN]),
            loopback_bypass: false,
        },
        ws: WsLimits::default(),
        frames: FrameConfig {
            min_interval: Duration::ZERO,
            ..FrameConfig::default()
        },
        gallery_dir: dir.join("gallery"),
        videos_dir: dir.join("security_videos"),
        ports: PortConfig {
            range_start: 4000,
            range_end: 4010,
            state_path: dir.join("ports/dynamic_ports.json"),
            refresh_interval: Duration::from_secs(60),
        },
        rate_limit_exempt_loopback: false,
        bootstrap_admin: None,
    }
}

/// Test fixture: state, router and the temp dir backing gallery and port
/// files. Keep it alive for the duration of the test.
pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub dir: TempDir,
}

impl TestApp {
    pub fn app(&self) -> Router {
        self.router.clone()
    }
}

pub fn build_test_state_with(pool: SqlitePool, tweak: impl FnOnce(&mut ServerConfig)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    tweak(&mut config);

    let port_manager = Arc::new(
        PortManager::new(
            config.ports.range_start,
            config.ports.range_end,
            config.ports.state_path.clone(),
            Arc::new(FakeProbe { busy_from: 4005 }),
        )
        .unwrap(),
    );
    let config = Arc::new(config);
    let state = AppState::new(pool, Arc::clone(&config), port_manager);
    let router = build_app_router(state.clone(), &config);

    TestApp { state, router, dir }
}

/// Build the full application router with all middleware layers, exactly as
/// `main.rs` does.
pub fn build_test_app(pool: SqlitePool) -> TestApp {
    build_test_state_with(pool, |_| {})
}

// ---------------------------------------------------------------------------
// Users and tokens
// ---------------------------------------------------------------------------

pub async fn create_user(pool: &SqlitePool, username: &str, role: &str) -> User {
    UserRepo::create(
        pool,
        &CreateUser {
            username: username.to_string(),
            password_hash: hash_password(TEST_PASSWORD).unwrap(),
            role: role.to_string(),
        },
    )
    .await
    .unwrap()
}

/// Access token for `user`, not bound to any address.
pub fn token_for(state: &AppState, user: &User) -> String {
    generate_access_token(user.id, &user.username, &user.role, None, &state.config.jwt).unwrap()
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

fn builder(method: &str, uri: &str, token: Option<&str>) -> axum::http::request::Builder {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", CLIENT_IP);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder
}

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, builder("GET", uri, None).body(Body::empty()).unwrap()).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, builder("GET", uri, Some(token)).body(Body::empty()).unwrap()).await
}

pub async fn delete_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    send(app, builder("DELETE", uri, Some(token)).body(Body::empty()).unwrap()).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    json_request(app, "POST", uri, None, body).await
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> Response<Body> {
    json_request(app, "POST", uri, Some(token), body).await
}

pub async fn put_json_auth(
    app: Router,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> Response<Body> {
    json_request(app, "PUT", uri, Some(token), body).await
}

async fn json_request(
    app: Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: serde_json::Value,
) -> Response<Body> {
    let request = builder(method, uri, token)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn body_bytes(response: Response<Body>) -> axum::body::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn assert_error(response: Response<Body>, status: StatusCode, code: &str) {
    assert_eq!(response.status(), status);
    let json = body_json(response).await;
    assert_eq!(json["code"], code, "unexpected error body: {json}");
}

/// Minimal JPEG: SOI marker plus padding.
pub fn jpeg(len: usize) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
    data.resize(len.max(4), 0);
    data
}
