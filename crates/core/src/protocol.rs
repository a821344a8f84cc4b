//! JSON messages exchanged over the WebSocket endpoints.
//!
//! Every message is an object tagged by `"type"`. Inbound enums are split per
//! peer so each session only accepts what its device actually sends.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::commands::{DeviceAction, ManualPhotoRequest, ServoCommand};
use crate::types::Timestamp;

/// Message types an inbound enum recognises.
pub trait InboundMessage: DeserializeOwned {
    const TYPES: &'static [&'static str];
}

/// Why an inbound text frame could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InboundError {
    #[error("Invalid JSON format")]
    InvalidJson,

    #[error("Unknown message type")]
    UnknownType(Option<String>),

    #[error("Malformed {kind} message: {reason}")]
    Malformed { kind: String, reason: String },
}

/// Decode a text frame into `T`, separating bad JSON, unknown `type` values
/// and known messages with bad fields.
pub fn parse_inbound<T: InboundMessage>(text: &str) -> Result<T, InboundError> {
    let value: Value = serde_json::from_str(text).map_err(|_| InboundError::InvalidJson)?;
    let kind = value.get("type").and_then(Value::as_str).map(str::to_owned);

    match kind {
        Some(kind) if T::TYPES.contains(&kind.as_str()) => {
            serde_json::from_value(value).map_err(|e| InboundError::Malformed {
                kind,
                reason: e.to_string(),
            })
        }
        other => Err(InboundError::UnknownType(other)),
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_sensor_type() -> String {
    "unknown".to_string()
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Messages sent by the Pico servo controller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PicoInbound {
    Ping,
    Pong,
    Connect {
        device: Option<String>,
        version: Option<String>,
    },
    Servo {
        #[serde(default)]
        command: ServoCommand,
    },
    Log {
        #[serde(default)]
        message: String,
        #[serde(default = "default_level")]
        level: String,
    },
    Ack {
        command_type: Option<String>,
        status: Option<String>,
    },
    Test {
        message: Option<String>,
    },
    SensorData {
        #[serde(default = "default_sensor_type")]
        sensor_type: String,
        #[serde(default)]
        data: Value,
    },
}

impl InboundMessage for PicoInbound {
    const TYPES: &'static [&'static str] = &[
        "ping",
        "pong",
        "connect",
        "servo",
        "log",
        "ack",
        "test",
        "sensor_data",
    ];
}

/// Sequence number carried inside a sensor payload, `0` when absent.
pub fn sensor_sequence(data: &Value) -> u64 {
    data.get("sequence").and_then(Value::as_u64).unwrap_or(0)
}

/// Text messages sent by the ESP32CAM. Frames arrive as binary messages.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CameraInbound {
    PhotoSent {
        #[serde(default)]
        size: u64,
    },
    PhotoError {
        message: Option<String>,
    },
    Log {
        #[serde(default)]
        message: String,
        #[serde(default = "default_level")]
        level: String,
    },
    SystemError {
        #[serde(default)]
        message: String,
    },
    Pong,
}

impl InboundMessage for CameraInbound {
    const TYPES: &'static [&'static str] =
        &["photo_sent", "photo_error", "log", "system_error", "pong"];
}

/// Messages sent by a dashboard browser.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserInbound {
    Authenticate {
        token: Option<String>,
    },
    Ping,
    Pong,
    GetStatus,
    Command {
        command: String,
        servo1: Option<i32>,
        servo2: Option<i32>,
        action: Option<String>,
        intensity: Option<u8>,
    },
}

impl InboundMessage for BrowserInbound {
    const TYPES: &'static [&'static str] = &["authenticate", "ping", "pong", "get_status", "command"];
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Messages the server sends to any peer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionAck {
        status: &'static str,
        message: String,
        timestamp: Timestamp,
    },
    Ping {
        timestamp: Timestamp,
        server_time: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        inactive_duration: Option<u64>,
    },
    Pong {
        timestamp: Timestamp,
    },
    Ack {
        command_type: String,
        status: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sensor_type: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sequence: Option<u64>,
        timestamp: Timestamp,
    },
    Error {
        message: String,
        timestamp: Timestamp,
    },
    Servo {
        command: ServoCommand,
        timestamp: Timestamp,
        source: &'static str,
    },
    Authenticated {
        username: String,
        role: String,
    },
    AuthFailed {
        message: String,
    },
    CommandResponse {
        status: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        command: Value,
    },
    Frame {
        data: String,
        size: usize,
        timestamp: Timestamp,
    },
    PhotoCaptured {
        filename: String,
        url: String,
        quality: u8,
        flash_used: bool,
        intensity: u8,
        timestamp: Timestamp,
    },
    ServoCommandLog {
        servo1: i32,
        servo2: i32,
        timestamp: Timestamp,
    },
    PhotoDeleted {
        filename: String,
    },
    VideoDeleted {
        filename: String,
    },
    Status {
        timestamp: Timestamp,
        #[serde(flatten)]
        payload: Value,
    },
}

impl ServerMessage {
    pub fn connection_ack(message: impl Into<String>) -> Self {
        ServerMessage::ConnectionAck {
            status: "success",
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn ping() -> Self {
        Self::ping_after(None)
    }

    /// Keep-alive ping, optionally reporting how long the peer was idle.
    pub fn ping_after(inactive_secs: Option<u64>) -> Self {
        let now = Utc::now();
        ServerMessage::Ping {
            timestamp: now,
            server_time: now.timestamp_millis() as f64 / 1000.0,
            inactive_duration: inactive_secs,
        }
    }

    pub fn pong() -> Self {
        ServerMessage::Pong {
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn auth_failed(message: impl Into<String>) -> Self {
        ServerMessage::AuthFailed {
            message: message.into(),
        }
    }

    pub fn ack(command_type: impl Into<String>, detail: Option<String>) -> Self {
        ServerMessage::Ack {
            command_type: command_type.into(),
            status: "success",
            detail,
            sensor_type: None,
            sequence: None,
            timestamp: Utc::now(),
        }
    }

    /// Negative acknowledgement for a command that was not carried out.
    pub fn nack(command_type: impl Into<String>, detail: impl Into<String>) -> Self {
        ServerMessage::Ack {
            command_type: command_type.into(),
            status: "failed",
            detail: Some(detail.into()),
            sensor_type: None,
            sequence: None,
            timestamp: Utc::now(),
        }
    }

    pub fn sensor_ack(sensor_type: impl Into<String>, sequence: u64) -> Self {
        ServerMessage::Ack {
            command_type: "sensor_data".to_string(),
            status: "success",
            detail: None,
            sensor_type: Some(sensor_type.into()),
            sequence: Some(sequence),
            timestamp: Utc::now(),
        }
    }

    /// Servo target relayed to the Pico.
    pub fn servo(command: ServoCommand, source: &'static str) -> Self {
        ServerMessage::Servo {
            command,
            timestamp: Utc::now(),
            source,
        }
    }

    pub fn servo_log(command: ServoCommand) -> Self {
        ServerMessage::ServoCommandLog {
            servo1: command.servo1,
            servo2: command.servo2,
            timestamp: Utc::now(),
        }
    }

    /// Dashboard notification about a servo command.
    pub fn servo_response(status: &'static str, message: Option<String>, command: ServoCommand) -> Self {
        ServerMessage::CommandResponse {
            status,
            message,
            command: serde_json::json!({
                "type": "servo",
                "servo1": command.servo1,
                "servo2": command.servo2,
            }),
        }
    }

    /// Dashboard notification about a device action.
    pub fn action_response(status: &'static str, action: DeviceAction, intensity: u8) -> Self {
        ServerMessage::CommandResponse {
            status,
            message: None,
            command: serde_json::json!({
                "type": "action",
                "action": action,
                "intensity": intensity,
            }),
        }
    }

    pub fn status(payload: Value) -> Self {
        ServerMessage::Status {
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Serialize for a text frame.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialize server message");
            String::from("{}")
        })
    }
}

/// Action command in the shape the camera firmware expects: an untagged
/// `{"action": ..., "intensity": ...}` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceCommand {
    pub action: DeviceAction,
    pub intensity: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flash: Option<bool>,
}

impl DeviceCommand {
    pub fn action(action: DeviceAction, intensity: u8) -> Self {
        Self {
            action,
            intensity,
            quality: None,
            flash: None,
        }
    }

    /// Manual photo request for the camera.
    pub fn capture_photo(req: &ManualPhotoRequest) -> Self {
        Self {
            action: DeviceAction::CapturePhoto,
            intensity: req.intensity,
            quality: Some(req.quality),
            flash: Some(req.flash),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialize device command");
            String::from("{}")
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_pico_messages() {
        let msg: PicoInbound = parse_inbound(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg, PicoInbound::Ping);

        let msg: PicoInbound =
            parse_inbound(r#"{"type":"servo","command":{"servo1":30,"servo2":150}}"#).unwrap();
        assert_eq!(
            msg,
            PicoInbound::Servo {
                command: ServoCommand { servo1: 30, servo2: 150 }
            }
        );

        let msg: PicoInbound = parse_inbound(r#"{"type":"log","message":"boot"}"#).unwrap();
        assert_matches!(msg, PicoInbound::Log { level, .. } if level == "info");
    }

    #[test]
    fn unit_variants_ignore_extra_fields() {
        let msg: PicoInbound =
            parse_inbound(r#"{"type":"pong","timestamp":"2024-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(msg, PicoInbound::Pong);
    }

    #[test]
    fn sensor_data_sequence() {
        let msg: PicoInbound = parse_inbound(
            r#"{"type":"sensor_data","sensor_type":"imu","data":{"sequence":42,"x":1}}"#,
        )
        .unwrap();
        let PicoInbound::SensorData { sensor_type, data } = msg else {
            panic!("expected sensor data");
        };
        assert_eq!(sensor_type, "imu");
        assert_eq!(sensor_sequence(&data), 42);
        assert_eq!(sensor_sequence(&json!({})), 0);
    }

    #[test]
    fn distinguishes_parse_failures() {
        assert_matches!(parse_inbound::<PicoInbound>("not json"), Err(InboundError::InvalidJson));
        assert_matches!(
            parse_inbound::<PicoInbound>(r#"{"type":"dance"}"#),
            Err(InboundError::UnknownType(Some(t))) if t == "dance"
        );
        assert_matches!(
            parse_inbound::<PicoInbound>(r#"{"message":"no type"}"#),
            Err(InboundError::UnknownType(None))
        );
        assert_matches!(
            parse_inbound::<PicoInbound>(r#"{"type":"servo","command":{"servo1":"left"}}"#),
            Err(InboundError::Malformed { kind, .. }) if kind == "servo"
        );
    }

    #[test]
    fn camera_types_are_scoped() {
        let msg: CameraInbound = parse_inbound(r#"{"type":"photo_sent","size":1234}"#).unwrap();
        assert_eq!(msg, CameraInbound::PhotoSent { size: 1234 });
        assert_matches!(
            parse_inbound::<CameraInbound>(r#"{"type":"servo"}"#),
            Err(InboundError::UnknownType(_))
        );
    }

    #[test]
    fn browser_authenticate_without_token() {
        let msg: BrowserInbound = parse_inbound(r#"{"type":"authenticate"}"#).unwrap();
        assert_eq!(msg, BrowserInbound::Authenticate { token: None });
    }

    #[test]
    fn server_messages_are_tagged() {
        let value: Value = serde_json::from_str(&ServerMessage::error("Unknown message type").to_json()).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], "Unknown message type");

        let value: Value =
            serde_json::from_str(&ServerMessage::servo(ServoCommand::default(), "web_interface").to_json())
                .unwrap();
        assert_eq!(value["type"], "servo");
        assert_eq!(value["command"]["servo1"], 90);
        assert_eq!(value["source"], "web_interface");

        let value: Value = serde_json::from_str(&ServerMessage::ping().to_json()).unwrap();
        assert_eq!(value["type"], "ping");
        assert!(value.get("inactive_duration").is_none());
    }

    #[test]
    fn status_payload_is_flattened() {
        let msg = ServerMessage::status(json!({ "system_ready": true, "web_clients_count": 2 }));
        let value: Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["system_ready"], true);
        assert_eq!(value["web_clients_count"], 2);
    }

    #[test]
    fn device_command_is_untagged() {
        let cmd = DeviceCommand::action(DeviceAction::FlashOn, 70);
        let value: Value = serde_json::from_str(&cmd.to_json()).unwrap();
        assert_eq!(value, json!({ "action": "flash_on", "intensity": 70 }));

        let photo = DeviceCommand::capture_photo(&ManualPhotoRequest::default());
        let value: Value = serde_json::from_str(&photo.to_json()).unwrap();
        assert_eq!(
            value,
            json!({ "action": "capture_photo", "intensity": 50, "quality": 80, "flash": false })
        );
    }
}
