use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use smartcam_core::frames::FrameStore;
use smartcam_core::port_manager::PortManager;
use smartcam_core::rate_limit::{ApiRateLimiter, LoginAttemptTracker, SlidingWindowLimiter};
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::devices::DeviceHub;
use crate::ws::WsManager;

/// Control endpoints allow this many requests per client per window.
const CONTROL_MAX_REQUESTS: usize = 100;
const CONTROL_WINDOW: Duration = Duration::from_secs(60);

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: smartcam_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (dashboard clients).
    pub ws_manager: Arc<WsManager>,
    /// Pico and ESP32CAM sessions.
    pub devices: Arc<DeviceHub>,
    /// Latest camera frames.
    pub frames: Arc<Mutex<FrameStore>>,
    /// Per-IP HTTP limits by endpoint class.
    pub api_limiter: Arc<ApiRateLimiter>,
    /// Failed-login tracking per client IP.
    pub login_attempts: Arc<LoginAttemptTracker>,
    /// Sliding-window limit for servo/action/photo commands.
    pub control_limiter: Arc<SlidingWindowLimiter>,
    /// Dynamic port manager.
    pub port_manager: Arc<PortManager>,
    /// Cancelled when the server starts shutting down; long-lived
    /// responses such as the MJPEG feed end on it.
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        pool: smartcam_db::DbPool,
        config: Arc<ServerConfig>,
        port_manager: Arc<PortManager>,
    ) -> Self {
        Self {
            pool,
            ws_manager: Arc::new(WsManager::new(config.ws.clone())),
            devices: Arc::new(DeviceHub::new()),
            frames: Arc::new(Mutex::new(FrameStore::new(config.frames.clone()))),
            api_limiter: Arc::new(ApiRateLimiter::new()),
            login_attempts: Arc::new(LoginAttemptTracker::default()),
            control_limiter: Arc::new(SlidingWindowLimiter::new(
                CONTROL_MAX_REQUESTS,
                CONTROL_WINDOW,
            )),
            port_manager,
            config,
            shutdown: CancellationToken::new(),
            started_at: Instant::now(),
        }
    }

    /// Lock the frame store, recovering from a poisoned lock.
    pub fn frames(&self) -> MutexGuard<'_, FrameStore> {
        self.frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
