//! Dynamic port selection with a persisted JSON state file.
//!
//! The manager scans a port range for bindable ports, hands out the lowest one
//! to the server, and records what it saw so an operator can inspect port usage
//! across restarts. The state file is written atomically (temp file + rename);
//! an unreadable file is backed up and replaced with the default state.

use std::collections::BTreeMap;
use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Ports gathered per scan.
pub const DEFAULT_SCAN_COUNT: usize = 20;

/// Errors raised by [`PortManager`].
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("No free ports found in range {start}..{end}")]
    Exhausted { start: u16, end: u16 },

    #[error("Port state I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Port state serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Checks whether a port can be bound.
pub trait PortProbe: Send + Sync {
    fn is_free(&self, port: u16) -> bool;
}

/// Probes ports by binding a TCP listener on all interfaces.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpPortProbe;

impl PortProbe for TcpPortProbe {
    fn is_free(&self, port: u16) -> bool {
        TcpListener::bind(("0.0.0.0", port)).is_ok()
    }
}

/// Persisted snapshot of port usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortState {
    pub current: Option<u16>,
    pub free: Vec<u16>,
    pub used: Vec<u16>,
    pub last_checked: Option<Timestamp>,
    pub usage_counts: BTreeMap<u16, u64>,
}

/// Hands out ports from `start..end` and keeps [`PortState`] on disk.
pub struct PortManager {
    start: u16,
    end: u16,
    state_path: PathBuf,
    probe: Arc<dyn PortProbe>,
    state: Mutex<PortState>,
}

impl std::fmt::Debug for PortManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortManager")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("state_path", &self.state_path)
            .finish_non_exhaustive()
    }
}

impl PortManager {
    /// Load (or initialise) the state file and build a manager for `start..end`.
    pub fn new(
        start: u16,
        end: u16,
        state_path: impl Into<PathBuf>,
        probe: Arc<dyn PortProbe>,
    ) -> Result<Self, PortError> {
        let state_path = state_path.into();
        if let Some(parent) = state_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let state = load_state(&state_path)?;

        let manager = Self {
            start,
            end,
            state_path,
            probe,
            state: Mutex::new(state),
        };
        manager.log_state("INIT");
        Ok(manager)
    }

    /// Scan the range in ascending order until `count` free ports are found.
    ///
    /// Occupied ports seen along the way become the `used` list.
    pub fn find_free_ports(&self, count: usize) -> Result<Vec<u16>, PortError> {
        let mut free = Vec::with_capacity(count);
        let mut used = Vec::new();
        for port in self.start..self.end {
            if self.probe.is_free(port) {
                free.push(port);
                if free.len() >= count {
                    break;
                }
            } else {
                used.push(port);
            }
        }

        let mut state = self.lock();
        state.free = free.clone();
        state.used = used;
        state.last_checked = Some(Utc::now());
        self.save(&state)?;
        drop(state);

        self.log_state("REFRESH");
        Ok(free)
    }

    /// Refresh and claim the lowest free port.
    pub fn pick_port(&self) -> Result<u16, PortError> {
        self.find_free_ports(DEFAULT_SCAN_COUNT)?;

        let mut state = self.lock();
        let port = state
            .free
            .iter()
            .copied()
            .min()
            .ok_or(PortError::Exhausted {
                start: self.start,
                end: self.end,
            })?;

        state.current = Some(port);
        state.free.retain(|p| *p != port);
        if !state.used.contains(&port) {
            state.used.push(port);
            state.used.sort_unstable();
        }
        *state.usage_counts.entry(port).or_insert(0) += 1;
        self.save(&state)?;
        drop(state);

        self.log_state("PICK");
        Ok(port)
    }

    /// Give back the currently held port. No-op when nothing is held.
    pub fn release_port(&self) -> Result<Option<u16>, PortError> {
        let mut state = self.lock();
        let Some(port) = state.current.take() else {
            return Ok(None);
        };
        state.used.retain(|p| *p != port);
        self.save(&state)?;
        drop(state);

        self.log_state("RELEASE");
        Ok(Some(port))
    }

    /// Re-probe recorded ports: `free` keeps still-free entries and `used`
    /// keeps still-busy ones.
    pub fn cleanup_state(&self) -> Result<(), PortError> {
        let (free, used) = {
            let state = self.lock();
            (state.free.clone(), state.used.clone())
        };
        let free: Vec<u16> = free.into_iter().filter(|p| self.probe.is_free(*p)).collect();
        let used: Vec<u16> = used.into_iter().filter(|p| !self.probe.is_free(*p)).collect();

        let mut state = self.lock();
        state.free = free;
        state.used = used;
        self.save(&state)?;
        drop(state);

        self.log_state("CLEANUP");
        Ok(())
    }

    /// One background refresh cycle.
    pub fn refresh(&self) -> Result<(), PortError> {
        self.find_free_ports(DEFAULT_SCAN_COUNT)?;
        self.cleanup_state()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> PortState {
        self.lock().clone()
    }

    /// Port currently held by this process, if any.
    pub fn current(&self) -> Option<u16> {
        self.lock().current
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Log the final state on shutdown.
    pub fn log_stop(&self) {
        self.log_state("STOP");
    }

    fn lock(&self) -> MutexGuard<'_, PortState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn save(&self, state: &PortState) -> Result<(), PortError> {
        let tmp = tmp_path(&self.state_path);
        let json = serde_json::to_vec_pretty(state)?;
        if let Err(e) = fs::write(&tmp, json).and_then(|_| fs::rename(&tmp, &self.state_path)) {
            let _ = fs::remove_file(&tmp);
            tracing::error!(error = %e, path = %self.state_path.display(), "Failed to save port state");
            return Err(e.into());
        }
        Ok(())
    }

    fn log_state(&self, tag: &'static str) {
        let state = self.lock();
        let current = state.current;
        let free = state.free.len();
        let used = state.used.len();
        drop(state);

        match tag {
            "REFRESH" | "CLEANUP" => {
                tracing::debug!(tag, ?current, free, used, "Port state");
            }
            _ => {
                tracing::info!(tag, ?current, free, used, "Port state");
            }
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn corrupted_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".corrupted_{}", Utc::now().timestamp()));
    PathBuf::from(name)
}

/// Read the state file. Missing keys take defaults; an empty or unparsable
/// file is backed up, removed and replaced by the default state.
fn load_state(path: &Path) -> Result<PortState, PortError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(PortState::default()),
        Err(e) => return Err(e.into()),
    };

    let parsed = if content.trim().is_empty() {
        None
    } else {
        serde_json::from_str::<PortState>(&content).ok()
    };

    match parsed {
        Some(state) => Ok(state),
        None => {
            let backup = corrupted_path(path);
            tracing::warn!(
                path = %path.display(),
                backup = %backup.display(),
                "Port state file is corrupt, resetting"
            );
            fs::copy(path, &backup)?;
            fs::remove_file(path)?;
            Ok(PortState::default())
        }
    }
}
