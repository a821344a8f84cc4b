//! Row structs and DTOs.
//!
//! Each submodule pairs a `FromRow` entity with the DTOs used to write it.

pub mod command;
pub mod log;
pub mod photo;
pub mod settings;
pub mod user;
pub mod video;
