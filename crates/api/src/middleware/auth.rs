//! JWT-based authentication extractor for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use smartcam_core::error::CoreError;
use smartcam_core::types::DbId;

use super::client_ip;
use crate::auth::jwt::{validate_token, Claims};
use crate::error::AppError;
use crate::state::AppState;

/// Name of the cookie carrying the access token for browser sessions.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Authenticated user extracted from a JWT.
///
/// The token is read from `Authorization: Bearer <token>` or, failing that,
/// the `access_token` cookie. A token bound to a client address is refused
/// when presented from a different one.
///
/// ```ignore
/// async fn my_handler(user: AuthUser) -> AppResult<Json<()>> {
///     tracing::info!(user_id = user.user_id, role = %user.role, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user's internal database id (from `claims.sub`).
    pub user_id: DbId,
    pub username: String,
    /// The user's role name (`"admin"` or `"user"`).
    pub role: String,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            username: claims.username,
            role: claims.role,
        }
    }
}

/// Pull the raw token from the request headers.
pub fn token_from_headers(headers: &HeaderMap) -> Result<&str, CoreError> {
    if let Some(header) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        return header.strip_prefix("Bearer ").ok_or_else(|| {
            CoreError::Unauthorized("Invalid Authorization format. Expected: Bearer <token>".into())
        });
    }

    headers
        .get_all("cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == ACCESS_TOKEN_COOKIE)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| CoreError::Unauthorized("Missing Authorization header".into()))
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = token_from_headers(&parts.headers)?;

        let claims = validate_token(token, &state.config.jwt).map_err(|_| {
            AppError::Core(CoreError::Unauthorized("Invalid or expired token".into()))
        })?;

        if let Some(bound_ip) = claims.ip.as_deref() {
            let caller = client_ip::resolve(parts);
            if caller.as_str() != bound_ip {
                tracing::warn!(
                    event = "session_hijacking_attempt",
                    user_id = claims.sub,
                    token_ip = %bound_ip,
                    request_ip = %caller.as_str(),
                    "Token presented from a different address"
                );
                return Err(AppError::Core(CoreError::Unauthorized(
                    "Token not valid for this client".into(),
                )));
            }
        }

        Ok(claims.into())
    }
}
