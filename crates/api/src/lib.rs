//! Smart camera API server library.
//!
//! Exposes the building blocks (config, state, error handling, routes,
//! device and browser WebSocket sessions) so integration tests and the binary
//! entrypoint share them.

pub mod auth;
pub mod background;
pub mod config;
pub mod control;
pub mod devices;
pub mod error;
pub mod gallery;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
