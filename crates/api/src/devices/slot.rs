//! Single-session slot for one device kind.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message};
use serde::Serialize;
use smartcam_core::device::DeviceKind;
use smartcam_core::types::Timestamp;

use super::DeviceError;
use crate::ws::manager::WsSender;

/// Error entries kept per device.
pub const MAX_DEVICE_ERRORS: usize = 50;

/// Minimum spacing between "not connected" error entries.
const OFFLINE_ERROR_INTERVAL: Duration = Duration::from_secs(300);

/// Close code sent to a session replaced by a newer connection.
const CLOSE_SUPERSEDED: u16 = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct DeviceErrorEntry {
    pub message: String,
    pub timestamp: Timestamp,
}

/// Public view of a device's connection state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceStatus {
    pub online: bool,
    pub last_seen: Option<Timestamp>,
    pub connected_at: Option<Timestamp>,
    pub addr: Option<String>,
    pub errors: Vec<DeviceErrorEntry>,
}

struct DeviceSession {
    session_id: String,
    sender: WsSender,
}

#[derive(Default)]
struct SlotInner {
    session: Option<DeviceSession>,
    status: DeviceStatus,
    last_offline_error: Option<Instant>,
}

impl SlotInner {
    fn push_error(&mut self, message: String) {
        let errors = &mut self.status.errors;
        errors.push(DeviceErrorEntry {
            message,
            timestamp: chrono::Utc::now(),
        });
        if errors.len() > MAX_DEVICE_ERRORS {
            let excess = errors.len() - MAX_DEVICE_ERRORS;
            errors.drain(..excess);
        }
    }
}

/// Holds at most one live session for a [`DeviceKind`].
pub struct DeviceSlot {
    kind: DeviceKind,
    inner: Mutex<SlotInner>,
}

impl DeviceSlot {
    pub fn new(kind: DeviceKind) -> Self {
        Self {
            kind,
            inner: Mutex::new(SlotInner::default()),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Install a new session. A session already holding the slot is sent a
    /// Close frame and replaced.
    ///
    /// Returns `true` when an older session was superseded.
    pub fn attach(&self, session_id: &str, sender: WsSender, addr: &str) -> bool {
        let mut inner = self.lock();
        let previous = inner.session.replace(DeviceSession {
            session_id: session_id.to_string(),
            sender,
        });

        let superseded = match previous {
            Some(old) => {
                let _ = old.sender.send(Message::Close(Some(CloseFrame {
                    code: CLOSE_SUPERSEDED,
                    reason: "superseded".into(),
                })));
                tracing::info!(
                    device = %self.kind,
                    old_session = %old.session_id,
                    new_session = %session_id,
                    "Device session superseded by reconnection"
                );
                true
            }
            None => false,
        };

        let now = chrono::Utc::now();
        inner.status.online = true;
        inner.status.last_seen = Some(now);
        inner.status.connected_at = Some(now);
        inner.status.addr = Some(addr.to_string());
        inner.last_offline_error = None;
        superseded
    }

    /// Clear the slot if `session_id` still owns it.
    pub fn detach(&self, session_id: &str) -> bool {
        let mut inner = self.lock();
        if inner
            .session
            .as_ref()
            .is_none_or(|s| s.session_id != session_id)
        {
            return false;
        }
        inner.session = None;
        inner.status.online = false;
        inner.status.last_seen = Some(chrono::Utc::now());
        true
    }

    /// Queue a message for the device.
    pub fn send(&self, message: Message) -> Result<(), DeviceError> {
        let mut inner = self.lock();

        let Some(session) = inner.session.as_ref() else {
            let due = inner
                .last_offline_error
                .is_none_or(|last| last.elapsed() >= OFFLINE_ERROR_INTERVAL);
            if due {
                inner.last_offline_error = Some(Instant::now());
                inner.push_error("Client not connected".to_string());
                tracing::warn!(device = %self.kind, "Device not connected, message dropped");
            }
            return Err(DeviceError::Offline(self.kind));
        };

        if session.sender.send(message).is_err() {
            inner.session = None;
            inner.status.online = false;
            inner.push_error("Send failed".to_string());
            tracing::warn!(device = %self.kind, "Device channel closed, marked offline");
            return Err(DeviceError::SendFailed(self.kind));
        }
        Ok(())
    }

    /// Update `last_seen` for inbound traffic.
    pub fn mark_seen(&self) {
        self.lock().status.last_seen = Some(chrono::Utc::now());
    }

    pub fn record_error(&self, message: impl Into<String>) {
        self.lock().push_error(message.into());
    }

    pub fn is_online(&self) -> bool {
        self.lock().session.is_some()
    }

    /// Id of the session currently holding the slot.
    pub fn session_id(&self) -> Option<String> {
        self.lock().session.as_ref().map(|s| s.session_id.clone())
    }

    pub fn status(&self) -> DeviceStatus {
        self.lock().status.clone()
    }
}
