pub mod auth;
pub mod control;
pub mod gallery;
pub mod logs;
pub mod ports;
pub mod settings;
pub mod status;
pub mod video;
