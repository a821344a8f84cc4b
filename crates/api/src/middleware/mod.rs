//! Request extractors and middleware.
//!
//! - [`auth::AuthUser`] -- Extracts the authenticated user from a JWT.
//! - [`rbac::RequireAdmin`] -- Requires the `admin` role.
//! - [`client_ip::ClientIp`] -- Resolves the caller's address.
//! - [`rate_limit::rate_limit`] -- Per-IP, per-endpoint-class HTTP limits.

pub mod auth;
pub mod client_ip;
pub mod rate_limit;
pub mod rbac;
