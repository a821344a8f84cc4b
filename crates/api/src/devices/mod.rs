//! Device-facing WebSocket sessions.
//!
//! The Pico servo controller and the ESP32CAM each hold at most one session
//! at a time in a [`DeviceSlot`]; [`DeviceHub`] groups both slots with the
//! recent sensor samples reported by the Pico.

pub mod auth;
pub mod esp32cam;
pub mod pico;
pub mod slot;

use std::collections::VecDeque;
use std::sync::Mutex;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use serde::Serialize;
use serde_json::Value;
use smartcam_core::commands::ManualPhotoRequest;
use smartcam_core::device::DeviceKind;
use smartcam_core::protocol::ServerMessage;
use smartcam_core::types::Timestamp;
use smartcam_db::repositories::LogRepo;
use smartcam_db::DbPool;

pub use auth::{authenticate_device, DeviceAuthError};
pub use slot::{DeviceSlot, DeviceStatus};

use crate::ws::text_frame;

/// Sensor samples retained before trimming.
const SENSOR_BUFFER_MAX: usize = 1000;
/// Samples kept after a trim.
const SENSOR_BUFFER_KEEP: usize = 500;

/// Close code for failed device authentication.
pub const CLOSE_AUTH_FAILED: u16 = 4001;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("{} not connected", .0.display_name())]
    Offline(DeviceKind),

    #[error("Failed to send to {}", .0.display_name())]
    SendFailed(DeviceKind),
}

/// One sensor reading from the Pico.
#[derive(Debug, Clone, Serialize)]
pub struct SensorReading {
    pub sensor_type: String,
    pub sequence: u64,
    pub data: Value,
    pub received_at: Timestamp,
}

#[derive(Debug, Clone, Serialize)]
pub struct DevicesStatus {
    pub pico: DeviceStatus,
    pub esp32cam: DeviceStatus,
    pub sensor_samples: usize,
}

pub struct DeviceHub {
    pub pico: DeviceSlot,
    pub camera: DeviceSlot,
    sensors: Mutex<VecDeque<SensorReading>>,
    pending_photo: Mutex<Option<ManualPhotoRequest>>,
}

impl DeviceHub {
    pub fn new() -> Self {
        Self {
            pico: DeviceSlot::new(DeviceKind::Pico),
            camera: DeviceSlot::new(DeviceKind::Esp32Cam),
            sensors: Mutex::new(VecDeque::new()),
            pending_photo: Mutex::new(None),
        }
    }

    pub fn slot(&self, kind: DeviceKind) -> &DeviceSlot {
        match kind {
            DeviceKind::Pico => &self.pico,
            DeviceKind::Esp32Cam => &self.camera,
        }
    }

    /// Append a sample; past the cap only the newest samples are kept.
    pub fn push_sensor(&self, reading: SensorReading) -> usize {
        let mut sensors = self.sensors.lock().unwrap_or_else(|p| p.into_inner());
        sensors.push_back(reading);
        if sensors.len() > SENSOR_BUFFER_MAX {
            let excess = sensors.len() - SENSOR_BUFFER_KEEP;
            sensors.drain(..excess);
        }
        sensors.len()
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Most recent samples, newest last.
    pub fn recent_sensors(&self, limit: usize) -> Vec<SensorReading> {
        let sensors = self.sensors.lock().unwrap_or_else(|p| p.into_inner());
        let skip = sensors.len().saturating_sub(limit);
        sensors.iter().skip(skip).cloned().collect()
    }

    /// Remember the settings of a photo requested from the camera.
    pub fn set_pending_photo(&self, request: ManualPhotoRequest) {
        *self.pending_photo.lock().unwrap_or_else(|p| p.into_inner()) = Some(request);
    }

    /// Settings of the outstanding photo request, if any.
    pub fn take_pending_photo(&self) -> Option<ManualPhotoRequest> {
        self.pending_photo.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    pub fn status(&self) -> DevicesStatus {
        DevicesStatus {
            pico: self.pico.status(),
            esp32cam: self.camera.status(),
            sensor_samples: self.sensor_count(),
        }
    }
}

impl Default for DeviceHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Persist a log line, logging rather than propagating a database failure.
pub(crate) async fn persist_log(pool: &DbPool, message: &str, level: &str, source: &str) {
    if let Err(e) = LogRepo::insert(pool, message, level, Some(source)).await {
        tracing::warn!(error = %e, source, "Failed to persist log entry");
    }
}

/// Tell an unauthenticated device why it is being dropped, then close.
pub(crate) async fn reject_socket(mut socket: WebSocket, kind: DeviceKind, err: DeviceAuthError) {
    tracing::warn!(device = %kind, reason = %err, "Device authentication failed");
    let _ = socket
        .send(text_frame(&ServerMessage::error("Authentication failed")))
        .await;
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_AUTH_FAILED,
            reason: err.to_string().into(),
        })))
        .await;
}
