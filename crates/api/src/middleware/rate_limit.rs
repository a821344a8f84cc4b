//! HTTP rate-limit middleware.
//!
//! Applied to the `/api/v1` router with `axum::middleware::from_fn_with_state`.
//! WebSocket upgrade routes live outside that router and are not limited here.

use axum::extract::{OriginalUri, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use smartcam_core::error::CoreError;
use smartcam_core::rate_limit::{is_loopback, EndpointClass};

use super::client_ip::ClientIp;
use crate::error::AppError;
use crate::state::AppState;

/// Reject requests over the per-IP limit of their endpoint class with 429.
pub async fn rate_limit(
    State(state): State<AppState>,
    client_ip: ClientIp,
    request: Request,
    next: Next,
) -> Response {
    if state.config.rate_limit_exempt_loopback && is_loopback(client_ip.as_str()) {
        return next.run(request).await;
    }

    // Nested routers see a stripped URI; classify on the full path.
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.path().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    if !state.api_limiter.check(client_ip.as_str(), &path) {
        let class = EndpointClass::classify(&path);
        tracing::warn!(
            client_ip = %client_ip.as_str(),
            path = %path,
            class = class.as_str(),
            "HTTP rate limit exceeded"
        );
        return AppError::Core(CoreError::RateLimited(
            "Too many requests, please slow down".into(),
        ))
        .into_response();
    }

    next.run(request).await
}
