//! WebSocket infrastructure for real-time communication.
//!
//! Provides the dashboard connection registry, heartbeat and cleanup tasks,
//! and the `/ws` upgrade handler. Device sockets live in [`crate::devices`].

mod handler;
mod heartbeat;
pub mod manager;

use axum::extract::ws::Message;
use smartcam_core::protocol::ServerMessage;

pub use handler::ws_handler;
pub use heartbeat::{start_cleanup, start_heartbeat};
pub use manager::WsManager;

/// Encode a server message as a text frame.
pub fn text_frame(message: &ServerMessage) -> Message {
    Message::text(message.to_json())
}
