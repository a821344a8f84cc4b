//! Domain logic for the smart camera server.
//!
//! Everything here is free of HTTP and database concerns so it can be unit
//! tested directly and shared by the API crate.

pub mod commands;
pub mod device;
pub mod error;
pub mod frames;
pub mod port_manager;
pub mod protocol;
pub mod rate_limit;
pub mod types;
