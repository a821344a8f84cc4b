//! Per-user settings and the log listing.

mod common;

use axum::http::StatusCode;
use common::{assert_error, body_json, create_user, get_auth, put_json_auth};
use serde_json::json;
use smartcam_db::repositories::LogRepo;
use sqlx::SqlitePool;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_settings_created_on_first_read(pool: SqlitePool) {
    let user = create_user(&pool, "operator", "user").await;
    let test = common::build_test_app(pool);
    let token = common::token_for(&test.state, &user);

    let response = get_auth(test.app(), "/api/v1/settings", &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["user_id"], user.id);
    assert_eq!(json["data"]["servo1"], 90);
    assert_eq!(json["data"]["theme"], "light");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_settings_partial_update(pool: SqlitePool) {
    let user = create_user(&pool, "operator", "user").await;
    let test = common::build_test_app(pool);
    let token = common::token_for(&test.state, &user);

    let response = put_json_auth(
        test.app(),
        "/api/v1/settings",
        &token,
        json!({ "theme": "dark", "servo2": 30 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = put_json_auth(test.app(), "/api/v1/settings", &token, json!({ "language": "en" })).await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["theme"], "dark");
    assert_eq!(json["data"]["servo2"], 30);
    assert_eq!(json["data"]["language"], "en");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_settings_reject_out_of_range(pool: SqlitePool) {
    let user = create_user(&pool, "operator", "user").await;
    let test = common::build_test_app(pool);
    let token = common::token_for(&test.state, &user);

    for body in [
        json!({ "servo1": 181 }),
        json!({ "photo_quality": 0 }),
        json!({ "theme": "neon" }),
        json!({ "language": "de" }),
    ] {
        let response = put_json_auth(test.app(), "/api/v1/settings", &token, body).await;
        assert_error(response, StatusCode::BAD_REQUEST, "VALIDATION_ERROR").await;
    }
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_logs_filter_and_limit(pool: SqlitePool) {
    let user = create_user(&pool, "operator", "user").await;
    LogRepo::insert(&pool, "pico up", "info", Some("pico")).await.unwrap();
    LogRepo::insert(&pool, "pico servo jam", "error", Some("pico")).await.unwrap();
    LogRepo::insert(&pool, "camera up", "info", Some("esp32cam")).await.unwrap();
    let test = common::build_test_app(pool);
    let token = common::token_for(&test.state, &user);

    let response = get_auth(test.app(), "/api/v1/logs?source=pico", &token).await;
    let json = body_json(response).await;
    let entries = json["data"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["message"], "pico servo jam");

    let response = get_auth(test.app(), "/api/v1/logs?source=pico&level=error", &token).await;
    let json = body_json(response).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);

    let response = get_auth(test.app(), "/api/v1/logs?limit=1", &token).await;
    let json = body_json(response).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
}
