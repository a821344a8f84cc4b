//! Control commands accepted from the dashboard and relayed to devices.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

pub const SERVO_MIN: i32 = 0;
pub const SERVO_MAX: i32 = 180;
pub const SERVO_CENTER: i32 = 90;

pub const DEFAULT_INTENSITY: u8 = 50;
pub const DEFAULT_PHOTO_QUALITY: u8 = 80;

fn default_servo() -> i32 {
    SERVO_CENTER
}

/// Target angles for the two pan/tilt servos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServoCommand {
    #[serde(default = "default_servo")]
    pub servo1: i32,
    #[serde(default = "default_servo")]
    pub servo2: i32,
}

impl Default for ServoCommand {
    fn default() -> Self {
        Self {
            servo1: SERVO_CENTER,
            servo2: SERVO_CENTER,
        }
    }
}

impl ServoCommand {
    /// Both angles clamped into `0..=180`.
    pub fn clamped(self) -> Self {
        Self {
            servo1: self.servo1.clamp(SERVO_MIN, SERVO_MAX),
            servo2: self.servo2.clamp(SERVO_MIN, SERVO_MAX),
        }
    }

    /// Acknowledgement detail sent back to the Pico.
    pub fn describe(&self) -> String {
        format!("servo1={}°, servo2={}°", self.servo1, self.servo2)
    }
}

macro_rules! device_actions {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Actions the camera firmware understands.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum DeviceAction {
            $($variant),+
        }

        impl DeviceAction {
            pub const ALL: &'static [DeviceAction] = &[$(DeviceAction::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(DeviceAction::$variant => $name),+
                }
            }
        }
    };
}

device_actions! {
    CapturePhoto => "capture_photo",
    ResetPosition => "reset_position",
    EmergencyStop => "emergency_stop",
    SystemReboot => "system_reboot",
    FlashOn => "flash_on",
    FlashOff => "flash_off",
    StartRecording => "start_recording",
    StopRecording => "stop_recording",
    SaveToGallery => "save_to_gallery",
    Buzzer => "buzzer",
    Led => "led",
    Motor => "motor",
    Relay => "relay",
    Custom => "custom",
    ServoReset => "servo_reset",
    CameraReset => "camera_reset",
    SystemStatus => "system_status",
    GetLogs => "get_logs",
    ClearLogs => "clear_logs",
    BackupSystem => "backup_system",
    RestoreSystem => "restore_system",
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        DeviceAction::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == wanted)
            .ok_or_else(|| {
                let allowed: Vec<&str> = DeviceAction::ALL.iter().map(|a| a.as_str()).collect();
                CoreError::Validation(format!(
                    "Invalid action '{wanted}'. Allowed actions: {}",
                    allowed.join(", ")
                ))
            })
    }
}

/// Dashboard request to run a device action.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ActionRequest {
    #[validate(length(min = 1, max = 50))]
    pub action: String,
    #[validate(range(max = 100))]
    pub intensity: Option<u8>,
}

impl ActionRequest {
    /// Validate and resolve into a whitelisted action with its intensity.
    pub fn resolve(&self) -> Result<(DeviceAction, u8), CoreError> {
        self.validate()?;
        let action = self.action.parse::<DeviceAction>()?;
        Ok((action, self.intensity.unwrap_or(DEFAULT_INTENSITY)))
    }
}

fn default_quality() -> u8 {
    DEFAULT_PHOTO_QUALITY
}

fn default_intensity() -> u8 {
    DEFAULT_INTENSITY
}

/// Dashboard request for a one-off photo.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ManualPhotoRequest {
    #[serde(default = "default_quality")]
    #[validate(range(min = 1, max = 100))]
    pub quality: u8,
    #[serde(default)]
    pub flash: bool,
    #[serde(default = "default_intensity")]
    #[validate(range(max = 100))]
    pub intensity: u8,
}

impl Default for ManualPhotoRequest {
    fn default() -> Self {
        Self {
            quality: DEFAULT_PHOTO_QUALITY,
            flash: false,
            intensity: DEFAULT_INTENSITY,
        }
    }
}
