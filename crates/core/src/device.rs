//! Device identity and shared-secret tokens.
//!
//! Microcontrollers do not log in; they present a pre-shared bearer token
//! when opening their WebSocket. Each device kind has its own allow-list so a
//! leaked camera token cannot drive the servos.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of generated device tokens.
const GENERATED_TOKEN_LEN: usize = 32;

/// Characters used when generating a device token.
const TOKEN_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";

/// Number of leading characters shown when a token is logged.
const MASK_PREFIX_LEN: usize = 10;

/// A microcontroller that holds a device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Servo controller.
    Pico,
    /// Camera module streaming JPEG frames.
    #[serde(rename = "esp32cam")]
    Esp32Cam,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 2] = [DeviceKind::Pico, DeviceKind::Esp32Cam];

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::Pico => "pico",
            DeviceKind::Esp32Cam => "esp32cam",
        }
    }

    /// Human-facing name used in close reasons and log lines.
    pub fn display_name(self) -> &'static str {
        match self {
            DeviceKind::Pico => "Pico",
            DeviceKind::Esp32Cam => "ESP32CAM",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a registered WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientKind {
    Web,
    Mobile,
    Pico,
    #[serde(rename = "esp32cam")]
    Esp32Cam,
}

impl ClientKind {
    pub const ALL: [ClientKind; 4] = [
        ClientKind::Web,
        ClientKind::Mobile,
        ClientKind::Pico,
        ClientKind::Esp32Cam,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ClientKind::Web => "web",
            ClientKind::Mobile => "mobile",
            ClientKind::Pico => "pico",
            ClientKind::Esp32Cam => "esp32cam",
        }
    }
}

impl From<DeviceKind> for ClientKind {
    fn from(kind: DeviceKind) -> Self {
        match kind {
            DeviceKind::Pico => ClientKind::Pico,
            DeviceKind::Esp32Cam => ClientKind::Esp32Cam,
        }
    }
}

/// Per-device-kind allow-lists of bearer tokens.
///
/// Tokens are kept as SHA-256 digests; plaintext is only seen at load time.
#[derive(Clone)]
pub struct DeviceTokens {
    pico: Vec<[u8; 32]>,
    esp32cam: Vec<[u8; 32]>,
}

impl fmt::Debug for DeviceTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceTokens")
            .field("pico", &self.pico.len())
            .field("esp32cam", &self.esp32cam.len())
            .finish()
    }
}

impl DeviceTokens {
    /// Build allow-lists from plaintext tokens.
    pub fn new<P, E>(pico: P, esp32cam: E) -> Self
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Self {
            pico: pico.into_iter().map(|t| digest(t.as_ref())).collect(),
            esp32cam: esp32cam.into_iter().map(|t| digest(t.as_ref())).collect(),
        }
    }

    /// Load tokens from raw env values.
    ///
    /// A missing or empty list gets one freshly generated token; its prefix is
    /// logged so the operator can provision the device.
    pub fn from_raw(pico_raw: Option<&str>, esp32cam_raw: Option<&str>) -> Self {
        let pico = tokens_or_generated(DeviceKind::Pico, pico_raw);
        let esp32cam = tokens_or_generated(DeviceKind::Esp32Cam, esp32cam_raw);
        Self::new(pico, esp32cam)
    }

    /// Check a presented token against the allow-list for `kind`.
    ///
    /// Every candidate is compared so timing does not reveal which entry
    /// matched.
    pub fn verify(&self, kind: DeviceKind, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        let presented = digest(token);
        let list = match kind {
            DeviceKind::Pico => &self.pico,
            DeviceKind::Esp32Cam => &self.esp32cam,
        };
        list.iter()
            .fold(false, |found, candidate| found | ct_eq(candidate, &presented))
    }

    /// Number of accepted tokens for `kind`.
    pub fn count(&self, kind: DeviceKind) -> usize {
        match kind {
            DeviceKind::Pico => self.pico.len(),
            DeviceKind::Esp32Cam => self.esp32cam.len(),
        }
    }
}

/// Parse a token list from either a JSON array or a comma separated string.
///
/// Blank entries are dropped. A malformed JSON array yields an empty list.
pub fn parse_token_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        return serde_json::from_str::<Vec<String>>(trimmed)
            .map(|tokens| {
                tokens
                    .into_iter()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();
    }
    trimmed
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Generate a random device token.
pub fn generate_device_token() -> String {
    let mut rng = rand::rng();
    (0..GENERATED_TOKEN_LEN)
        .map(|_| TOKEN_CHARSET[rng.random_range(0..TOKEN_CHARSET.len())] as char)
        .collect()
}

/// Shorten a token for log output.
pub fn mask_token(token: &str) -> String {
    let prefix: String = token.chars().take(MASK_PREFIX_LEN).collect();
    format!("{prefix}...")
}

fn tokens_or_generated(kind: DeviceKind, raw: Option<&str>) -> Vec<String> {
    let tokens = raw.map(parse_token_list).unwrap_or_default();
    if !tokens.is_empty() {
        tracing::info!(
            device = %kind,
            count = tokens.len(),
            tokens = ?tokens.iter().map(|t| mask_token(t)).collect::<Vec<_>>(),
            "Loaded device tokens"
        );
        return tokens;
    }
    let token = generate_device_token();
    tracing::warn!(
        device = %kind,
        token = %mask_token(&token),
        "No device tokens configured, generated one"
    );
    vec![token]
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

fn ct_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
