use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use smartcam_core::device::DeviceTokens;
use smartcam_core::frames::FrameConfig;

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Fixed bind port. When unset the dynamic port manager picks one.
    pub port: Option<u16>,
    /// SQLite connection string.
    pub database_url: String,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    pub jwt: JwtConfig,
    pub devices: DeviceConfig,
    pub ws: WsLimits,
    pub frames: FrameConfig,
    /// Directory photos are written to.
    pub gallery_dir: PathBuf,
    /// Directory the recorder drops security clips into.
    pub videos_dir: PathBuf,
    pub ports: PortConfig,
    /// Skip HTTP rate limits for loopback clients.
    pub rate_limit_exempt_loopback: bool,
    /// Credentials used to create the first admin when no users exist.
    pub bootstrap_admin: Option<(String, String)>,
}

/// Device socket authentication settings.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub tokens: DeviceTokens,
    /// Accept device sockets from loopback without a token.
    pub loopback_bypass: bool,
}

/// Limits applied by the browser connection registry.
#[derive(Debug, Clone)]
pub struct WsLimits {
    pub max_clients: usize,
    pub messages_per_minute: u32,
    pub inactive_timeout: Duration,
    pub error_threshold: u32,
}

impl Default for WsLimits {
    fn default() -> Self {
        Self {
            max_clients: 100,
            messages_per_minute: 100,
            inactive_timeout: Duration::from_secs(300),
            error_threshold: 10,
        }
    }
}

/// Dynamic port manager settings.
#[derive(Debug, Clone)]
pub struct PortConfig {
    pub range_start: u16,
    pub range_end: u16,
    pub state_path: PathBuf,
    pub refresh_interval: Duration,
}

/// Read and parse an env var, falling back to `default` when unset.
///
/// # Panics
///
/// Panics if the variable is set but does not parse.
fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid value: {e}")),
        Err(_) => default,
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                              |
    /// |-------------------------------|--------------------------------------|
    /// | `HOST`                        | `0.0.0.0`                            |
    /// | `PORT`                        | unset (dynamic)                      |
    /// | `DATABASE_URL`                | `sqlite://smart_camera_system.db`    |
    /// | `CORS_ORIGINS`                | `http://localhost:5173`              |
    /// | `REQUEST_TIMEOUT_SECS`        | `30`                                 |
    /// | `PICO_AUTH_TOKENS`            | generated                            |
    /// | `ESP32CAM_AUTH_TOKENS`        | generated                            |
    /// | `DEVICE_LOOPBACK_BYPASS`      | `false`                              |
    /// | `MAX_WEBSOCKET_CLIENTS`       | `100`                                |
    /// | `INACTIVE_CLIENT_TIMEOUT`     | `300`                                |
    /// | `WEBSOCKET_ERROR_THRESHOLD`   | `10`                                 |
    /// | `WS_MESSAGES_PER_MINUTE`      | `100`                                |
    /// | `MAX_FRAME_SIZE`              | `2097152`                            |
    /// | `FRAME_BUFFER_SIZE`           | `50`                                 |
    /// | `FRAME_DROP_RATIO`            | `0.1`                                |
    /// | `MIN_FRAME_INTERVAL_MS`       | `33`                                 |
    /// | `FRAME_SKIP_THRESHOLD`        | `3`                                  |
    /// | `GALLERY_DIR`                 | `./gallery`                          |
    /// | `SECURITY_VIDEOS_DIR`         | `./security_videos`                  |
    /// | `PORT_RANGE_START`            | `3000`                               |
    /// | `PORT_RANGE_END`              | `9000`                               |
    /// | `PORT_STATE_PATH`             | `./port_state/dynamic_ports.json`    |
    /// | `PORT_REFRESH_INTERVAL_SECS`  | `60`                                 |
    /// | `RATE_LIMIT_EXEMPT_LOOPBACK`  | `true`                               |
    /// | `ADMIN_USERNAME`              | unset                                |
    /// | `ADMIN_PASSWORD`              | unset                                |
    ///
    /// JWT settings are documented on [`JwtConfig::from_env`].
    pub fn from_env() -> Self {
        let host = env_string("HOST", "0.0.0.0");

        let port = std::env::var("PORT").ok().map(|raw| {
            raw.trim()
                .parse::<u16>()
                .expect("PORT must be a valid u16")
        });

        let database_url = env_string("DATABASE_URL", "sqlite://smart_camera_system.db");

        let cors_origins: Vec<String> = env_string("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env_parse("REQUEST_TIMEOUT_SECS", 30);

        let tokens = DeviceTokens::from_raw(
            std::env::var("PICO_AUTH_TOKENS").ok().as_deref(),
            std::env::var("ESP32CAM_AUTH_TOKENS").ok().as_deref(),
        );
        let devices = DeviceConfig {
            tokens,
            loopback_bypass: env_parse("DEVICE_LOOPBACK_BYPASS", false),
        };

        let ws = WsLimits {
            max_clients: env_parse("MAX_WEBSOCKET_CLIENTS", 100),
            messages_per_minute: env_parse("WS_MESSAGES_PER_MINUTE", 100),
            inactive_timeout: Duration::from_secs(env_parse("INACTIVE_CLIENT_TIMEOUT", 300)),
            error_threshold: env_parse("WEBSOCKET_ERROR_THRESHOLD", 10),
        };

        let frames = FrameConfig {
            capacity: env_parse("FRAME_BUFFER_SIZE", 50),
            max_frame_size: env_parse("MAX_FRAME_SIZE", 2 * 1024 * 1024),
            drop_ratio: env_parse("FRAME_DROP_RATIO", 0.1),
            min_interval: Duration::from_millis(env_parse("MIN_FRAME_INTERVAL_MS", 33)),
            skip_threshold: env_parse("FRAME_SKIP_THRESHOLD", 3),
        };

        let ports = PortConfig {
            range_start: env_parse("PORT_RANGE_START", 3000),
            range_end: env_parse("PORT_RANGE_END", 9000),
            state_path: PathBuf::from(env_string(
                "PORT_STATE_PATH",
                "./port_state/dynamic_ports.json",
            )),
            refresh_interval: Duration::from_secs(env_parse("PORT_REFRESH_INTERVAL_SECS", 60)),
        };
        assert!(
            ports.range_start < ports.range_end,
            "PORT_RANGE_START must be below PORT_RANGE_END"
        );

        let bootstrap_admin = match (std::env::var("ADMIN_USERNAME"), std::env::var("ADMIN_PASSWORD")) {
            (Ok(user), Ok(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        };

        Self {
            host,
            port,
            database_url,
            cors_origins,
            request_timeout_secs,
            jwt: JwtConfig::from_env(),
            devices,
            ws,
            frames,
            gallery_dir: PathBuf::from(env_string("GALLERY_DIR", "./gallery")),
            videos_dir: PathBuf::from(env_string("SECURITY_VIDEOS_DIR", "./security_videos")),
            ports,
            rate_limit_exempt_loopback: env_parse("RATE_LIMIT_EXEMPT_LOOPBACK", true),
            bootstrap_admin,
        }
    }
}
