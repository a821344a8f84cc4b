//! Per-IP HTTP limits applied by the middleware.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{assert_error, post_json};
use serde_json::json;
use sqlx::SqlitePool;

fn login_body() -> serde_json::Value {
    json!({ "username": "nobody", "password": "camera_pass_2024" })
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_login_class_limited_per_ip(pool: SqlitePool) {
    let test = common::build_test_app(pool);

    for _ in 0..5 {
        let response = post_json(test.app(), "/api/v1/auth/login", login_body()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = post_json(test.app(), "/api/v1/auth/login", login_body()).await;
    assert_error(response, StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED").await;

    // Another address has its own budget.
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/auth/login")
        .header("x-forwarded-for", "198.51.100.44")
        .header("content-type", "application/json")
        .body(Body::from(login_body().to_string()))
        .unwrap();
    let response = common::send(test.app(), request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_loopback_exempt_when_configured(pool: SqlitePool) {
    let test = common::build_test_state_with(pool, |config| {
        config.rate_limit_exempt_loopback = true;
    });

    // Past the 100/min general API budget; only auth failures come back.
    for _ in 0..110 {
        let request = Request::builder()
            .uri("/api/v1/auth/me")
            .header("x-forwarded-for", "127.0.0.1")
            .body(Body::empty())
            .unwrap();
        let response = common::send(test.app(), request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_general_api_budget(pool: SqlitePool) {
    let test = common::build_test_app(pool);

    for _ in 0..100 {
        let response = common::get(test.app(), "/api/v1/auth/me").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = common::get(test.app(), "/api/v1/auth/me").await;
    assert_error(response, StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED").await;
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_health_is_not_limited(pool: SqlitePool) {
    let test = common::build_test_app(pool);

    for _ in 0..120 {
        let response = common::get(test.app(), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
