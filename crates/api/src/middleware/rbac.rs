//! Admin-only extractor for operations that change server-wide state
//! (port allocation).

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use smartcam_core::error::CoreError;
use smartcam_db::models::user::ROLE_ADMIN;

use super::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

/// An authenticated caller holding the `admin` role; 403 otherwise.
pub struct RequireAdmin(pub AuthUser);

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            tracing::info!(
                user_id = user.user_id,
                role = %user.role,
                path = %parts.uri.path(),
                "Non-admin refused"
            );
            return Err(AppError::Core(CoreError::Forbidden(format!(
                "Role '{}' may not manage ports",
                user.role
            ))));
        }
        Ok(RequireAdmin(user))
    }
}
