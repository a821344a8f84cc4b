//! Dynamic port endpoints backed by a fake probe (4000..4005 free).

mod common;

use axum::http::StatusCode;
use common::{assert_error, body_json, create_user, get_auth, post_json_auth};
use serde_json::json;
use sqlx::SqlitePool;

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_free_ports_scan(pool: SqlitePool) {
    let user = create_user(&pool, "operator", "user").await;
    let test = common::build_test_app(pool);
    let token = common::token_for(&test.state, &user);

    let response = get_auth(test.app(), "/api/v1/ports/free", &token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["free_ports"], json!([4000, 4001, 4002, 4003, 4004]));
    assert_eq!(json["data"]["count"], 5);

    let response = get_auth(test.app(), "/api/v1/ports/used", &token).await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["used_ports"], json!([4005, 4006, 4007, 4008, 4009]));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_pick_and_release_require_admin(pool: SqlitePool) {
    let user = create_user(&pool, "operator", "user").await;
    let test = common::build_test_app(pool);
    let token = common::token_for(&test.state, &user);

    let response = post_json_auth(test.app(), "/api/v1/ports/pick", &token, json!({})).await;
    assert_error(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;

    let response = post_json_auth(test.app(), "/api/v1/ports/release", &token, json!({})).await;
    assert_error(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_pick_then_release(pool: SqlitePool) {
    let admin = create_user(&pool, "admin", "admin").await;
    let test = common::build_test_app(pool);
    let token = common::token_for(&test.state, &admin);

    let response = post_json_auth(test.app(), "/api/v1/ports/pick", &token, json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["port"], 4000);

    let response = get_auth(test.app(), "/api/v1/ports/state", &token).await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["current"], 4000);
    assert_eq!(json["data"]["usage_counts"]["4000"], 1);
    assert!(json["data"]["state_file"].as_str().unwrap().ends_with("dynamic_ports.json"));

    let response = post_json_auth(test.app(), "/api/v1/ports/release", &token, json!({})).await;
    assert_eq!(body_json(response).await["data"]["released"], 4000);

    let response = post_json_auth(test.app(), "/api/v1/ports/release", &token, json!({})).await;
    assert!(body_json(response).await["data"]["released"].is_null());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_pick_with_exhausted_range(pool: SqlitePool) {
    let admin = create_user(&pool, "admin", "admin").await;
    let test = common::build_test_state_with(pool, |config| {
        // Every port in 4005..4010 is busy under the fake probe.
        config.ports.range_start = 4005;
    });
    let token = common::token_for(&test.state, &admin);

    let response = post_json_auth(test.app(), "/api/v1/ports/pick", &token, json!({})).await;
    assert_error(response, StatusCode::SERVICE_UNAVAILABLE, "NO_FREE_PORT").await;
}
