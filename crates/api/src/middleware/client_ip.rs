//! Client address resolution.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;

/// Placeholder used when no address can be determined.
pub const UNKNOWN_IP: &str = "unknown";

/// The caller's IP address as a string.
///
/// Resolution order: the socket peer address (when the server runs with
/// connect info), the first `X-Forwarded-For` entry, `X-Real-IP`, then
/// [`UNKNOWN_IP`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl ClientIp {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_known(&self) -> bool {
        self.0 != UNKNOWN_IP
    }
}

/// Resolve the client address from request parts.
pub fn resolve(parts: &Parts) -> ClientIp {
    if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        return ClientIp(addr.ip().to_string());
    }
    ClientIp(from_headers(&parts.headers).unwrap_or_else(|| UNKNOWN_IP.to_string()))
}

fn from_headers(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(resolve(parts))
    }
}
