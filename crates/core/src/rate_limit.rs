//! In-memory request rate limiting.
//!
//! Three limiters cover the server's needs:
//!
//! - [`SlidingWindowLimiter`] -- exact per-key sliding window (device control).
//! - [`ApiRateLimiter`] -- fixed windows keyed by client IP and endpoint class.
//! - [`LoginAttemptTracker`] -- failed-login counting with a temporary ban.
//!
//! All limiters take an explicit `now` in their `*_at` variants so tests can
//! drive time deterministically. A rejected request is never recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Once a limiter tracks more keys than this, idle keys are purged.
const PRUNE_THRESHOLD: usize = 1000;

/// Fixed-window entries older than this are purged during a prune.
const STALE_ENTRY_AGE: Duration = Duration::from_secs(3600);

/// Returns `true` only for `127.0.0.1`, `::1` and `localhost`. Other
/// addresses in `127.0.0.0/8` do not count.
pub fn is_loopback(ip: &str) -> bool {
    matches!(ip, "127.0.0.1" | "::1" | "localhost")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn elapsed(now: Instant, earlier: Instant) -> Duration {
    now.saturating_duration_since(earlier)
}

// ---------------------------------------------------------------------------
// Sliding window
// ---------------------------------------------------------------------------

/// Sliding-window limiter: at most `max_requests` per key within `window`.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_requests: usize,
    window: Duration,
    entries: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Check and record a request for `key` at the current instant.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    /// Check and record a request for `key` at `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut entries = lock(&self.entries);

        if entries.len() > PRUNE_THRESHOLD {
            let window = self.window;
            entries.retain(|_, stamps| {
                stamps.back().is_some_and(|last| elapsed(now, *last) < window)
            });
        }

        let stamps = entries.entry(key.to_string()).or_default();
        while stamps
            .front()
            .is_some_and(|first| elapsed(now, *first) >= self.window)
        {
            stamps.pop_front();
        }

        if stamps.len() >= self.max_requests {
            tracing::warn!(key, limit = self.max_requests, "Rate limit exceeded");
            return false;
        }

        stamps.push_back(now);
        true
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        lock(&self.entries).len()
    }
}

// ---------------------------------------------------------------------------
// Fixed window
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

/// Fixed-window counter keyed by arbitrary strings.
///
/// The first request opens a window; requests inside it increment the count
/// until `max_requests`, and the first request after it opens a new window.
#[derive(Debug, Default)]
pub struct FixedWindowLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_at(&self, key: &str, max_requests: u32, window: Duration, now: Instant) -> bool {
        let mut windows = lock(&self.windows);

        if windows.len() > PRUNE_THRESHOLD {
            windows.retain(|_, w| elapsed(now, w.started) < STALE_ENTRY_AGE);
        }

        match windows.get_mut(key) {
            Some(w) if elapsed(now, w.started) < window => {
                if w.count >= max_requests {
                    tracing::warn!(key, count = w.count, limit = max_requests, "Rate limit exceeded");
                    return false;
                }
                w.count += 1;
            }
            _ => {
                windows.insert(
                    key.to_string(),
                    Window {
                        count: 1,
                        started: now,
                    },
                );
            }
        }
        true
    }

    /// Current count for `key` if its window is still open at `now`.
    pub fn current_count(&self, key: &str, window: Duration, now: Instant) -> Option<u32> {
        lock(&self.windows)
            .get(key)
            .filter(|w| elapsed(now, w.started) < window)
            .map(|w| w.count)
    }
}

// ---------------------------------------------------------------------------
// Endpoint classes
// ---------------------------------------------------------------------------

/// Rate-limit bucket an HTTP path falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointClass {
    Login,
    Mobile,
    Upload,
    Api,
    General,
}

impl EndpointClass {
    /// Classify a request path. More specific prefixes win.
    pub fn classify(path: &str) -> Self {
        if path.starts_with("/login")
            || path.starts_with("/register")
            || path.starts_with("/api/v1/auth/login")
        {
            EndpointClass::Login
        } else if path.starts_with("/api/mobile/") {
            EndpointClass::Mobile
        } else if path.starts_with("/upload")
            || path.starts_with("/set_")
            || path.starts_with("/api/v1/control/")
            || path.starts_with("/api/v1/video/frame")
        {
            EndpointClass::Upload
        } else if path.starts_with("/api/") {
            EndpointClass::Api
        } else {
            EndpointClass::General
        }
    }

    /// `(max_requests, window)` for this class.
    pub fn limits(self) -> (u32, Duration) {
        match self {
            EndpointClass::Login => (5, Duration::from_secs(300)),
            EndpointClass::Mobile => (30, Duration::from_secs(60)),
            EndpointClass::Upload => (50, Duration::from_secs(60)),
            EndpointClass::Api | EndpointClass::General => (100, Duration::from_secs(60)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EndpointClass::Login => "login",
            EndpointClass::Mobile => "mobile",
            EndpointClass::Upload => "upload",
            EndpointClass::Api => "api",
            EndpointClass::General => "general",
        }
    }
}

/// Per-IP, per-endpoint-class HTTP rate limiter.
#[derive(Debug, Default)]
pub struct ApiRateLimiter {
    windows: FixedWindowLimiter,
}

impl ApiRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, client_ip: &str, path: &str) -> bool {
        self.check_at(client_ip, path, Instant::now())
    }

    pub fn check_at(&self, client_ip: &str, path: &str, now: Instant) -> bool {
        let class = EndpointClass::classify(path);
        let (max_requests, window) = class.limits();
        let key = format!("{client_ip}:{}", class.as_str());
        self.windows.check_at(&key, max_requests, window, now)
    }
}

// ---------------------------------------------------------------------------
// Login attempts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
struct Attempts {
    count: u32,
    last_attempt: Option<Instant>,
    blocked_until: Option<Instant>,
}

/// Tracks failed logins per client IP and bans repeat offenders.
#[derive(Debug)]
pub struct LoginAttemptTracker {
    max_attempts: u32,
    window: Duration,
    ban: Duration,
    attempts: Mutex<HashMap<String, Attempts>>,
}

impl Default for LoginAttemptTracker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(300), Duration::from_secs(300))
    }
}

impl LoginAttemptTracker {
    pub fn new(max_attempts: u32, window: Duration, ban: Duration) -> Self {
        Self {
            max_attempts,
            window,
            ban,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_allowed(&self, client_ip: &str) -> bool {
        self.is_allowed_at(client_ip, Instant::now())
    }

    /// Whether `client_ip` may attempt a login at `now`.
    ///
    /// Reaching the failure limit inside the window starts a ban.
    pub fn is_allowed_at(&self, client_ip: &str, now: Instant) -> bool {
        let mut attempts = lock(&self.attempts);
        let window = self.window;

        attempts.retain(|_, a| {
            a.blocked_until.is_some_and(|until| until > now)
                || a.last_attempt.is_some_and(|last| elapsed(now, last) < window)
        });

        let entry = attempts.entry(client_ip.to_string()).or_default();

        if entry.blocked_until.is_some_and(|until| until > now) {
            return false;
        }

        if entry.last_attempt.is_none_or(|last| elapsed(now, last) >= window) {
            entry.count = 0;
        }

        if entry.count >= self.max_attempts {
            entry.blocked_until = Some(now + self.ban);
            tracing::warn!(client_ip, "Login attempts exceeded, client banned");
            return false;
        }

        true
    }

    pub fn record(&self, client_ip: &str, success: bool) {
        self.record_at(client_ip, success, Instant::now());
    }

    pub fn record_at(&self, client_ip: &str, success: bool, now: Instant) {
        let mut attempts = lock(&self.attempts);
        let entry = attempts.entry(client_ip.to_string()).or_default();

        if success {
            entry.count = 0;
            entry.blocked_until = None;
            return;
        }

        entry.count += 1;
        entry.last_attempt = Some(now);
        if entry.count >= self.max_attempts {
            entry.blocked_until = Some(now + self.ban);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sliding_window_rejects_over_limit_and_recovers() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();

        assert!(limiter.check_at("10.0.0.1", t0));
        assert!(limiter.check_at("10.0.0.1", t0 + Duration::from_secs(1)));
        assert!(limiter.check_at("10.0.0.1", t0 + Duration::from_secs(2)));
        assert!(!limiter.check_at("10.0.0.1", t0 + Duration::from_secs(3)));

        // The first stamp slides out of the window.
        assert!(limiter.check_at("10.0.0.1", t0 + Duration::from_secs(60)));
        assert!(!limiter.check_at("10.0.0.1", t0 + Duration::from_secs(61)));
    }

    #[test]
    fn sliding_window_keys_are_independent() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_at("a", now));
        assert!(!limiter.check_at("a", now));
        assert!(limiter.check_at("b", now));
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn fixed_window_resets_after_window() {
        let limiter = FixedWindowLimiter::new();
        let window = Duration::from_secs(60);
        let t0 = Instant::now();

        assert!(limiter.check_at("k", 2, window, t0));
        assert!(limiter.check_at("k", 2, window, t0));
        assert!(!limiter.check_at("k", 2, window, t0 + Duration::from_secs(59)));
        assert_eq!(limiter.current_count("k", window, t0), Some(2));

        assert!(limiter.check_at("k", 2, window, t0 + Duration::from_secs(60)));
        assert_eq!(
            limiter.current_count("k", window, t0 + Duration::from_secs(60)),
            Some(1)
        );
    }

    #[test]
    fn endpoint_classification() {
        assert_eq!(EndpointClass::classify("/api/v1/auth/login"), EndpointClass::Login);
        assert_eq!(EndpointClass::classify("/login"), EndpointClass::Login);
        assert_eq!(EndpointClass::classify("/api/mobile/otp"), EndpointClass::Mobile);
        assert_eq!(EndpointClass::classify("/api/v1/control/servo"), EndpointClass::Upload);
        assert_eq!(EndpointClass::classify("/set_servo"), EndpointClass::Upload);
        assert_eq!(EndpointClass::classify("/api/v1/status"), EndpointClass::Api);
        assert_eq!(EndpointClass::classify("/health"), EndpointClass::General);
    }

    #[test]
    fn api_limiter_buckets_by_class() {
        let limiter = ApiRateLimiter::new();
        let now = Instant::now();

        for _ in 0..5 {
            assert!(limiter.check_at("203.0.113.9", "/api/v1/auth/login", now));
        }
        assert!(!limiter.check_at("203.0.113.9", "/api/v1/auth/login", now));

        // Other classes for the same IP are unaffected.
        assert!(limiter.check_at("203.0.113.9", "/api/v1/status", now));
    }

    #[test]
    fn login_tracker_bans_after_max_failures() {
        let tracker = LoginAttemptTracker::new(3, Duration::from_secs(300), Duration::from_secs(300));
        let t0 = Instant::now();

        for i in 0..3 {
            assert!(tracker.is_allowed_at("198.51.100.7", t0 + Duration::from_secs(i)));
            tracker.record_at("198.51.100.7", false, t0 + Duration::from_secs(i));
        }

        assert!(!tracker.is_allowed_at("198.51.100.7", t0 + Duration::from_secs(10)));
        assert!(!tracker.is_allowed_at("198.51.100.7", t0 + Duration::from_secs(200)));
        assert!(tracker.is_allowed_at("198.51.100.7", t0 + Duration::from_secs(303)));
    }

    #[test]
    fn login_tracker_success_resets() {
        let tracker = LoginAttemptTracker::new(2, Duration::from_secs(300), Duration::from_secs(300));
        let now = Instant::now();

        tracker.record_at("ip", false, now);
        tracker.record_at("ip", true, now);
        tracker.record_at("ip", false, now);
        assert!(tracker.is_allowed_at("ip", now));
    }

    #[test]
    fn login_tracker_forgets_old_failures() {
        let tracker = LoginAttemptTracker::new(2, Duration::from_secs(300), Duration::from_secs(300));
        let t0 = Instant::now();

        tracker.record_at("ip", false, t0);
        assert!(tracker.is_allowed_at("ip", t0 + Duration::from_secs(301)));
        tracker.record_at("ip", false, t0 + Duration::from_secs(301));
        assert!(tracker.is_allowed_at("ip", t0 + Duration::from_secs(302)));
    }

    #[test]
    fn loopback_detection() {
        assert!(is_loopback("127.0.0.1"));
        assert!(is_loopback("::1"));
        assert!(is_loopback("localhost"));
        assert!(!is_loopback("127.0.0.42"));
        assert!(!is_loopback("::ffff:127.0.0.1"));
        assert!(!is_loopback("192.168.1.10"));
        assert!(!is_loopback("unknown"));
    }
}
