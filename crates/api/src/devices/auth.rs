//! Bearer-token check for device sockets.

use axum::http::HeaderMap;
use smartcam_core::device::DeviceKind;
use smartcam_core::rate_limit::is_loopback;

use crate::config::DeviceConfig;
use crate::middleware::client_ip::ClientIp;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceAuthError {
    #[error("Missing authorization")]
    MissingAuthorization,

    #[error("Invalid {} token", .0.display_name())]
    InvalidToken(DeviceKind),
}

/// Check the `Authorization` header of a device upgrade request against the
/// allow-list for `kind`.
///
/// Loopback callers skip the check only when the bypass is configured.
pub fn authenticate_device(
    kind: DeviceKind,
    headers: &HeaderMap,
    client_ip: &ClientIp,
    config: &DeviceConfig,
) -> Result<(), DeviceAuthError> {
    if config.loopback_bypass && is_loopback(client_ip.as_str()) {
        tracing::debug!(device = %kind, "Loopback device connection, token check skipped");
        return Ok(());
    }

    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(DeviceAuthError::MissingAuthorization)?;

    let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
    if config.tokens.verify(kind, token) {
        Ok(())
    } else {
        Err(DeviceAuthError::InvalidToken(kind))
    }
}
