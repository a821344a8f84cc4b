//! Live WebSocket sessions against a server bound to an ephemeral port.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use common::{create_user, TestApp, CAMERA_TOKEN, PICO_TOKEN};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use smartcam_api::ws::manager::ConnectionMeta;
use smartcam_db::repositories::PhotoRepo;
use sqlx::SqlitePool;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn spawn_server(test: &TestApp) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = test.app();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, path: &str, token: Option<&str>) -> Client {
    let mut request = format!("ws://{addr}{path}").into_client_request().unwrap();
    if let Some(token) = token {
        request
            .headers_mut()
            .insert("authorization", format!("Bearer {token}").parse().unwrap());
    }
    let (client, _) = tokio_tungstenite::connect_async(request).await.unwrap();
    client
}

/// Next JSON text message, skipping control frames.
async fn next_json(client: &mut Client) -> Value {
    loop {
        let message = tokio::time::timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .unwrap();
        match message {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

/// Read JSON messages until one has the given `type`.
async fn next_of_type(client: &mut Client, kind: &str) -> Value {
    loop {
        let json = next_json(client).await;
        if json["type"] == kind {
            return json;
        }
    }
}

async fn expect_close(client: &mut Client, code: u16) {
    loop {
        let message = tokio::time::timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for close");
        match message {
            Some(Ok(Message::Close(Some(frame)))) => {
                assert_eq!(u16::from(frame.code), code);
                return;
            }
            Some(Ok(Message::Text(_) | Message::Ping(_))) => continue,
            other => panic!("expected close frame, got {other:?}"),
        }
    }
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ---------------------------------------------------------------------------
// Pico
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_pico_session_acks_sensor_data(pool: SqlitePool) {
    let test = common::build_test_app(pool);
    let addr = spawn_server(&test).await;

    let mut pico = connect(addr, "/ws/pico", Some(PICO_TOKEN)).await;
    let ack = next_json(&mut pico).await;
    assert_eq!(ack["type"], "connection_ack");
    assert!(test.state.devices.pico.is_online());

    pico.send(Message::Text(
        json!({ "type": "sensor_data", "sensor_type": "temperature", "data": { "sequence": 7, "value": 21.5 } })
            .to_string(),
    ))
    .await
    .unwrap();
    let ack = next_json(&mut pico).await;
    assert_eq!(ack["type"], "ack");
    assert_eq!(ack["sensor_type"], "temperature");
    assert_eq!(ack["sequence"], 7);
    assert_eq!(test.state.devices.sensor_count(), 1);

    pico.send(Message::Text(json!({ "type": "ping" }).to_string())).await.unwrap();
    assert_eq!(next_json(&mut pico).await["type"], "pong");

    pico.send(Message::Text("{not json".to_string())).await.unwrap();
    let error = next_json(&mut pico).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["message"], "Invalid JSON format");

    pico.send(Message::Text(json!({ "type": "dance" }).to_string())).await.unwrap();
    let error = next_json(&mut pico).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["message"], "Unknown message type");

    pico.close(None).await.unwrap();
    let devices = test.state.devices.clone();
    wait_until(move || !devices.pico.is_online()).await;
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_pico_bad_token_closes_with_4001(pool: SqlitePool) {
    let test = common::build_test_app(pool);
    let addr = spawn_server(&test).await;

    let mut pico = connect(addr, "/ws/pico", Some("wrong-token")).await;
    let error = next_json(&mut pico).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["message"], "Authentication failed");
    expect_close(&mut pico, 4001).await;
    assert!(!test.state.devices.pico.is_online());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_camera_token_is_not_a_pico_token(pool: SqlitePool) {
    let test = common::build_test_app(pool);
    let addr = spawn_server(&test).await;

    let mut pico = connect(addr, "/ws/pico", Some(CAMERA_TOKEN)).await;
    next_of_type(&mut pico, "error").await;
    expect_close(&mut pico, 4001).await;
}

// ---------------------------------------------------------------------------
// ESP32CAM
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_camera_frames_reach_dashboards(pool: SqlitePool) {
    let test = common::build_test_app(pool);
    let addr = spawn_server(&test).await;
    let mut dashboard = test
        .state
        .ws_manager
        .add("dash".to_string(), ConnectionMeta::web(1, "viewer", "10.0.0.8"))
        .await
        .unwrap();

    let mut camera = connect(addr, "/ws/esp32cam", Some(CAMERA_TOKEN)).await;
    assert_eq!(next_json(&mut camera).await["type"], "connection_ack");

    camera.send(Message::Binary(common::jpeg(128))).await.unwrap();

    let frame = tokio::time::timeout(WAIT, dashboard.recv()).await.unwrap().unwrap();
    let axum::extract::ws::Message::Text(text) = frame else {
        panic!("expected text frame");
    };
    let json: Value = serde_json::from_str(text.as_str()).unwrap();
    assert_eq!(json["type"], "frame");
    assert_eq!(json["size"], 128);
    assert_eq!(test.state.frames().stats().frame_count, 1);

    // Garbage is counted but not stored.
    camera.send(Message::Binary(b"GIF89a....".to_vec())).await.unwrap();
    let frames = test.state.clone();
    wait_until(move || frames.frames().stats().invalid_count == 1).await;
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_photo_sent_saves_latest_frame(pool: SqlitePool) {
    let test = common::build_test_app(pool.clone());
    let addr = spawn_server(&test).await;
    let mut dashboard = test
        .state
        .ws_manager
        .add("dash".to_string(), ConnectionMeta::web(1, "viewer", "10.0.0.8"))
        .await
        .unwrap();

    let mut camera = connect(addr, "/ws/esp32cam", Some(CAMERA_TOKEN)).await;
    next_json(&mut camera).await;

    camera.send(Message::Binary(common::jpeg(256))).await.unwrap();
    camera
        .send(Message::Text(json!({ "type": "photo_sent", "size": 256 }).to_string()))
        .await
        .unwrap();

    let captured = loop {
        let message = tokio::time::timeout(WAIT, dashboard.recv()).await.unwrap().unwrap();
        if let axum::extract::ws::Message::Text(text) = message {
            let json: Value = serde_json::from_str(text.as_str()).unwrap();
            if json["type"] == "photo_captured" {
                break json;
            }
        }
    };
    let filename = captured["filename"].as_str().unwrap().to_string();
    assert!(filename.starts_with("manual_photo_"));
    assert_eq!(captured["url"], format!("/api/v1/gallery/{filename}"));

    let photo = PhotoRepo::find_by_filename(&pool, &filename).await.unwrap().unwrap();
    assert_eq!(photo.quality, 80);
    let bytes = std::fs::read(test.state.config.gallery_dir.join(&filename)).unwrap();
    assert_eq!(bytes.len(), 256);
}

async fn next_photo_captured(
    dashboard: &mut tokio::sync::mpsc::UnboundedReceiver<axum::extract::ws::Message>,
) -> Value {
    loop {
        let message = tokio::time::timeout(WAIT, dashboard.recv()).await.unwrap().unwrap();
        if let axum::extract::ws::Message::Text(text) = message {
            let json: Value = serde_json::from_str(text.as_str()).unwrap();
            if json["type"] == "photo_captured" {
                return json;
            }
        }
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_back_to_back_photos_keep_both_files(pool: SqlitePool) {
    let test = common::build_test_app(pool.clone());
    let addr = spawn_server(&test).await;
    let mut dashboard = test
        .state
        .ws_manager
        .add("dash".to_string(), ConnectionMeta::web(1, "viewer", "10.0.0.8"))
        .await
        .unwrap();

    let mut camera = connect(addr, "/ws/esp32cam", Some(CAMERA_TOKEN)).await;
    next_json(&mut camera).await;
    camera.send(Message::Binary(common::jpeg(200))).await.unwrap();
    for _ in 0..2 {
        camera
            .send(Message::Text(json!({ "type": "photo_sent", "size": 200 }).to_string()))
            .await
            .unwrap();
    }

    let first = next_photo_captured(&mut dashboard).await;
    let second = next_photo_captured(&mut dashboard).await;
    assert_ne!(first["filename"], second["filename"]);
    assert_eq!(PhotoRepo::count(&pool).await.unwrap(), 2);
    for captured in [first, second] {
        let filename = captured["filename"].as_str().unwrap();
        let bytes = std::fs::read(test.state.config.gallery_dir.join(filename)).unwrap();
        assert_eq!(bytes.len(), 200);
    }
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_dashboard_authenticates_with_first_message(pool: SqlitePool) {
    let user = create_user(&pool, "viewer", "user").await;
    let test = common::build_test_app(pool);
    let token = common::token_for(&test.state, &user);
    let addr = spawn_server(&test).await;

    let mut browser = connect(addr, "/ws", None).await;
    browser
        .send(Message::Text(json!({ "type": "authenticate", "token": token }).to_string()))
        .await
        .unwrap();

    let authenticated = next_json(&mut browser).await;
    assert_eq!(authenticated["type"], "authenticated");
    assert_eq!(authenticated["username"], "viewer");
    let status = next_json(&mut browser).await;
    assert_eq!(status["type"], "status");
    assert_eq!(status["web_clients_count"], 1);

    browser.send(Message::Text(json!({ "type": "ping" }).to_string())).await.unwrap();
    assert_eq!(next_of_type(&mut browser, "pong").await["type"], "pong");

    browser
        .send(Message::Text(
            json!({ "type": "command", "command": "servo", "servo1": 30, "servo2": 60 }).to_string(),
        ))
        .await
        .unwrap();
    let ack = next_of_type(&mut browser, "ack").await;
    assert_eq!(ack["command_type"], "servo");
    assert!(ack["detail"].as_str().unwrap().contains("warning"));

    browser
        .send(Message::Text(json!({ "type": "command", "command": "dance" }).to_string()))
        .await
        .unwrap();
    let nack = next_of_type(&mut browser, "ack").await;
    assert_eq!(nack["status"], "failed");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_dashboard_rejects_bad_token(pool: SqlitePool) {
    let test = common::build_test_app(pool);
    let addr = spawn_server(&test).await;

    let mut browser = connect(addr, "/ws", None).await;
    browser
        .send(Message::Text(json!({ "type": "authenticate", "token": "nope" }).to_string()))
        .await
        .unwrap();

    let failed = next_json(&mut browser).await;
    assert_eq!(failed["type"], "auth_failed");
    assert_eq!(failed["message"], "Invalid token");
    expect_close(&mut browser, 4001).await;
    assert_eq!(test.state.ws_manager.connection_count().await, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_dashboard_requires_authenticate_first(pool: SqlitePool) {
    let test = common::build_test_app(pool);
    let addr = spawn_server(&test).await;

    let mut browser = connect(addr, "/ws", None).await;
    browser.send(Message::Text(json!({ "type": "ping" }).to_string())).await.unwrap();

    let failed = next_json(&mut browser).await;
    assert_eq!(failed["message"], "Invalid authentication message");
    expect_close(&mut browser, 4001).await;
}

async fn authenticated_browser(addr: SocketAddr, token: &str) -> Client {
    let mut browser = connect(addr, "/ws", None).await;
    browser
        .send(Message::Text(json!({ "type": "authenticate", "token": token }).to_string()))
        .await
        .unwrap();
    assert_eq!(next_json(&mut browser).await["type"], "authenticated");
    browser
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_dashboard_messages_over_limit_are_dropped(pool: SqlitePool) {
    let user = create_user(&pool, "viewer", "user").await;
    let test = common::build_test_state_with(pool, |config| {
        config.ws.messages_per_minute = 2;
    });
    let token = common::token_for(&test.state, &user);
    let addr = spawn_server(&test).await;
    let mut browser = authenticated_browser(addr, &token).await;

    for _ in 0..2 {
        browser.send(Message::Text(json!({ "type": "ping" }).to_string())).await.unwrap();
        next_of_type(&mut browser, "pong").await;
    }

    browser.send(Message::Text(json!({ "type": "ping" }).to_string())).await.unwrap();
    let error = next_of_type(&mut browser, "error").await;
    assert_eq!(error["message"], "Rate limit exceeded");

    // The third ping never gets an answer.
    let deadline = tokio::time::Instant::now() + Duration::from_millis(300);
    while let Ok(message) = tokio::time::timeout_at(deadline, browser.next()).await {
        match message {
            Some(Ok(Message::Text(text))) => {
                let json: Value = serde_json::from_str(&text).unwrap();
                assert_ne!(json["type"], "pong", "rate limited ping was answered");
            }
            Some(_) => continue,
            None => break,
        }
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_full_registry_closes_with_policy_violation(pool: SqlitePool) {
    let user = create_user(&pool, "viewer", "user").await;
    let test = common::build_test_state_with(pool, |config| {
        config.ws.max_clients = 1;
    });
    let token = common::token_for(&test.state, &user);
    let addr = spawn_server(&test).await;
    let _occupant = test
        .state
        .ws_manager
        .add("occupant".to_string(), ConnectionMeta::web(2, "other", "10.0.0.9"))
        .await
        .unwrap();

    let mut browser = connect(addr, "/ws", None).await;
    browser
        .send(Message::Text(json!({ "type": "authenticate", "token": token }).to_string()))
        .await
        .unwrap();

    let error = next_of_type(&mut browser, "error").await;
    assert_eq!(error["message"], "Maximum WebSocket clients reached.");
    expect_close(&mut browser, 1008).await;
    assert_eq!(test.state.ws_manager.connection_count().await, 1);
}
