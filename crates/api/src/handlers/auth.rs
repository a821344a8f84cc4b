//! Handlers for the `/auth` resource (login, logout, me).

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use smartcam_core::error::CoreError;
use smartcam_db::models::user::UserResponse;
use smartcam_db::repositories::{LogRepo, UserRepo};

use crate::auth::jwt::generate_access_token;
use crate::auth::password::{validate_password_strength, verify_password, MIN_PASSWORD_LENGTH};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{AuthUser, ACCESS_TOKEN_COOKIE};
use crate::middleware::client_ip::ClientIp;
use crate::response::DataResponse;
use crate::state::AppState;

/// Maximum consecutive failed login attempts before locking the account.
const MAX_FAILED_ATTEMPTS: i64 = 5;

/// Duration in minutes to lock an account after exceeding failed attempts.
const LOCK_DURATION_MINS: i64 = 15;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 50;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Successful login response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserResponse,
}

fn invalid_credentials() -> AppError {
    AppError::Core(CoreError::Unauthorized(
        "Invalid username or password".into(),
    ))
}

fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!("{ACCESS_TOKEN_COOKIE}={token}; HttpOnly; SameSite=Strict; Path=/; Max-Age={max_age_secs}")
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/auth/login
///
/// Authenticate with username + password. Returns an access token bound to
/// the caller's address and sets it as an `HttpOnly` cookie.
pub async fn login(
    State(state): State<AppState>,
    client_ip: ClientIp,
    Json(input): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let ip = client_ip.as_str();

    // 1. Per-IP gate on repeated failures.
    if !state.login_attempts.is_allowed(ip) {
        return Err(AppError::Core(CoreError::RateLimited(
            "Too many login attempts. Try again later.".into(),
        )));
    }

    // 2. Input shape.
    let username = input.username.trim();
    let name_len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&name_len) {
        return Err(AppError::Core(CoreError::Validation(format!(
            "Username must be between {USERNAME_MIN} and {USERNAME_MAX} characters"
        ))));
    }
    validate_password_strength(&input.password, MIN_PASSWORD_LENGTH)
        .map_err(|msg| AppError::Core(CoreError::Validation(msg)))?;

    // 3. Find user by username.
    let Some(user) = UserRepo::find_by_username(&state.pool, username).await? else {
        state.login_attempts.record(ip, false);
        tracing::info!(client_ip = %ip, "Login failed: unknown user");
        return Err(invalid_credentials());
    };

    // 4. Account state.
    if !user.is_active {
        return Err(AppError::Core(CoreError::Forbidden(
            "Account is deactivated".into(),
        )));
    }
    let now = Utc::now();
    if user.is_locked(now) {
        return Err(AppError::Core(CoreError::Forbidden(
            "Account is temporarily locked. Try again later.".into(),
        )));
    }

    // 5. Verify password.
    let password_valid = verify_password(&input.password, &user.password_hash)
        .map_err(|e| AppError::InternalError(format!("Password verification error: {e}")))?;

    if !password_valid {
        state.login_attempts.record(ip, false);
        let lock_until = now + chrono::Duration::minutes(LOCK_DURATION_MINS);
        let failures =
            UserRepo::record_failed_login(&state.pool, user.id, MAX_FAILED_ATTEMPTS, lock_until)
                .await?;
        if failures >= MAX_FAILED_ATTEMPTS {
            tracing::warn!(user_id = user.id, failures, "Account locked after failed logins");
        }
        return Err(invalid_credentials());
    }

    // 6. On success: reset counters and issue a token.
    state.login_attempts.record(ip, true);
    UserRepo::record_successful_login(&state.pool, user.id, now).await?;

    let bound_ip = client_ip.is_known().then_some(ip);
    let access_token =
        generate_access_token(user.id, &user.username, &user.role, bound_ip, &state.config.jwt)
            .map_err(|e| AppError::InternalError(format!("Token generation error: {e}")))?;
    let expires_in = state.config.jwt.access_token_expiry_mins * 60;

    LogRepo::insert(
        &state.pool,
        &format!("User {} logged in", user.username),
        "info",
        Some("auth"),
    )
    .await?;
    tracing::info!(user_id = user.id, client_ip = %ip, "User logged in");

    let response = LoginResponse {
        access_token: access_token.clone(),
        token_type: "bearer",
        expires_in,
        user: UserResponse::from(&user),
    };

    Ok((
        [(SET_COOKIE, session_cookie(&access_token, expires_in))],
        Json(response),
    ))
}

/// POST /api/v1/auth/logout
///
/// Clears the session cookie. Returns 204 No Content.
pub async fn logout(auth_user: AuthUser) -> impl IntoResponse {
    tracing::info!(user_id = auth_user.user_id, "User logged out");
    (StatusCode::NO_CONTENT, [(SET_COOKIE, session_cookie("", 0))])
}

/// GET /api/v1/auth/me
pub async fn me(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<DataResponse<UserResponse>>> {
    let user = UserRepo::find_by_id(&state.pool, auth_user.user_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "User",
            id: auth_user.user_id,
        })?;
    Ok(Json(DataResponse {
        data: UserResponse::from(&user),
    }))
}
