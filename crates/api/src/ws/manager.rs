use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message};
use serde::Serialize;
use smartcam_core::device::ClientKind;
use smartcam_core::types::{DbId, Timestamp};
use tokio::sync::{mpsc, RwLock};

use crate::config::WsLimits;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Length of the per-connection inbound rate window.
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Close code sent when the server evicts or shuts down a connection.
const CLOSE_NORMAL: u16 = 1000;

/// Why [`WsManager::add`] refused a connection.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("Maximum WebSocket clients reached ({max})")]
    AtCapacity { max: usize },
}

/// Who is on the other end of a connection.
#[derive(Debug, Clone)]
pub struct ConnectionMeta {
    pub kind: ClientKind,
    pub user_id: Option<DbId>,
    pub username: Option<String>,
    pub addr: Option<String>,
}

impl ConnectionMeta {
    pub fn web(user_id: DbId, username: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            kind: ClientKind::Web,
            user_id: Some(user_id),
            username: Some(username.into()),
            addr: Some(addr.into()),
        }
    }
}

/// Metadata for a single WebSocket connection.
struct WsConnection {
    meta: ConnectionMeta,
    sender: WsSender,
    connected_at: Timestamp,
    last_activity: Instant,
    message_count: u64,
    error_count: u32,
    window_started: Instant,
    window_count: u32,
    rate_limited: bool,
}

impl WsConnection {
    fn send(&mut self, message: Message) -> bool {
        if self.sender.send(message).is_ok() {
            true
        } else {
            self.error_count += 1;
            false
        }
    }
}

/// Snapshot returned by [`WsManager::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct WsStats {
    pub total_connections: usize,
    pub max_connections: usize,
    pub by_kind: BTreeMap<&'static str, usize>,
    pub rate_limited_connections: usize,
    pub total_messages: u64,
    pub total_errors: u64,
}

/// Per-connection detail returned by [`WsManager::connection_info`].
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: String,
    pub kind: ClientKind,
    pub user_id: Option<DbId>,
    pub username: Option<String>,
    pub addr: Option<String>,
    pub connected_at: Timestamp,
    pub idle_secs: u64,
    pub message_count: u64,
    pub error_count: u32,
    pub rate_limited: bool,
}

/// Manages all registered dashboard WebSocket connections.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
pub struct WsManager {
    limits: WsLimits,
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    pub fn new(limits: WsLimits) -> Self {
        Self {
            limits,
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub fn limits(&self) -> &WsLimits {
        &self.limits
    }

    /// Register a new connection.
    ///
    /// Returns the receiver half of the message channel so the caller can
    /// forward messages to the WebSocket sink, or [`WsError::AtCapacity`]
    /// when the registry is full.
    pub async fn add(
        &self,
        conn_id: String,
        meta: ConnectionMeta,
    ) -> Result<mpsc::UnboundedReceiver<Message>, WsError> {
        let mut conns = self.connections.write().await;
        if conns.len() >= self.limits.max_clients {
            tracing::warn!(
                conn_id = %conn_id,
                max = self.limits.max_clients,
                "WebSocket registry full, refusing connection"
            );
            return Err(WsError::AtCapacity {
                max: self.limits.max_clients,
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let now = Instant::now();
        conns.insert(
            conn_id,
            WsConnection {
                meta,
                sender: tx,
                connected_at: chrono::Utc::now(),
                last_activity: now,
                message_count: 0,
                error_count: 0,
                window_started: now,
                window_count: 0,
                rate_limited: false,
            },
        );
        Ok(rx)
    }

    /// Remove a connection by its ID. Returns `true` if it was registered.
    pub async fn remove(&self, conn_id: &str) -> bool {
        self.connections.write().await.remove(conn_id).is_some()
    }

    /// Record inbound traffic on `conn_id`.
    ///
    /// Returns `false` when the connection exceeded its per-minute message
    /// limit (or is not registered); the caller should drop the message.
    pub async fn touch(&self, conn_id: &str) -> bool {
        self.touch_at(conn_id, Instant::now()).await
    }

    pub async fn touch_at(&self, conn_id: &str, now: Instant) -> bool {
        let mut conns = self.connections.write().await;
        let Some(conn) = conns.get_mut(conn_id) else {
            return false;
        };

        conn.last_activity = now;
        if now.saturating_duration_since(conn.window_started) >= RATE_WINDOW {
            conn.window_started = now;
            conn.window_count = 0;
        }
        if conn.window_count >= self.limits.messages_per_minute {
            if !conn.rate_limited {
                tracing::warn!(conn_id = %conn_id, "WebSocket client rate limited");
            }
            conn.rate_limited = true;
            return false;
        }

        conn.window_count += 1;
        conn.message_count += 1;
        conn.rate_limited = false;
        true
    }

    /// Send a message to one connection. Returns `false` if it is gone or
    /// its channel is closed.
    pub async fn send_to(&self, conn_id: &str, message: Message) -> bool {
        self.connections
            .write()
            .await
            .get_mut(conn_id)
            .is_some_and(|conn| conn.send(message))
    }

    /// Broadcast to every connection, optionally restricted to one client
    /// kind and skipping `exclude`. Returns the number of successful sends.
    pub async fn broadcast(
        &self,
        message: Message,
        kind: Option<ClientKind>,
        exclude: Option<&str>,
    ) -> usize {
        let mut conns = self.connections.write().await;
        let mut delivered = 0;
        for (id, conn) in conns.iter_mut() {
            if exclude == Some(id.as_str()) {
                continue;
            }
            if kind.is_some_and(|k| k != conn.meta.kind) {
                continue;
            }
            if conn.send(message.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Send a message to all connections belonging to a specific user.
    ///
    /// Returns the number of connections the message was sent to.
    pub async fn send_to_user(&self, user_id: DbId, message: Message) -> usize {
        let mut conns = self.connections.write().await;
        let mut count = 0;
        for conn in conns.values_mut() {
            if conn.meta.user_id == Some(user_id) && conn.send(message.clone()) {
                count += 1;
            }
        }
        count
    }

    /// Close and remove connections that were idle longer than the inactive
    /// timeout or accumulated too many send errors.
    ///
    /// Returns `(conn_id, reason)` for each evicted connection.
    pub async fn evict_stale(&self) -> Vec<(String, &'static str)> {
        self.evict_stale_at(Instant::now()).await
    }

    pub async fn evict_stale_at(&self, now: Instant) -> Vec<(String, &'static str)> {
        let mut conns = self.connections.write().await;
        let mut evicted = Vec::new();

        for (id, conn) in conns.iter() {
            let reason = if now.saturating_duration_since(conn.last_activity)
                > self.limits.inactive_timeout
            {
                Some("inactive")
            } else if conn.error_count >= self.limits.error_threshold {
                Some("too many errors")
            } else {
                None
            };
            if let Some(reason) = reason {
                evicted.push((id.clone(), reason));
            }
        }

        for (id, reason) in &evicted {
            if let Some(conn) = conns.remove(id) {
                let _ = conn.sender.send(Message::Close(Some(CloseFrame {
                    code: CLOSE_NORMAL,
                    reason: (*reason).into(),
                })));
                tracing::info!(conn_id = %id, reason, "Evicted WebSocket connection");
            }
        }
        evicted
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn stats(&self) -> WsStats {
        let conns = self.connections.read().await;
        let mut by_kind: BTreeMap<&'static str, usize> =
            ClientKind::ALL.iter().map(|k| (k.as_str(), 0)).collect();
        let mut rate_limited_connections = 0;
        let mut total_messages = 0;
        let mut total_errors = 0;

        for conn in conns.values() {
            *by_kind.entry(conn.meta.kind.as_str()).or_default() += 1;
            if conn.rate_limited {
                rate_limited_connections += 1;
            }
            total_messages += conn.message_count;
            total_errors += u64::from(conn.error_count);
        }

        WsStats {
            total_connections: conns.len(),
            max_connections: self.limits.max_clients,
            by_kind,
            rate_limited_connections,
            total_messages,
            total_errors,
        }
    }

    pub async fn connection_info(&self, conn_id: &str) -> Option<ConnectionInfo> {
        let conns = self.connections.read().await;
        let conn = conns.get(conn_id)?;
        Some(ConnectionInfo {
            id: conn_id.to_string(),
            kind: conn.meta.kind,
            user_id: conn.meta.user_id,
            username: conn.meta.username.clone(),
            addr: conn.meta.addr.clone(),
            connected_at: conn.connected_at,
            idle_secs: conn.last_activity.elapsed().as_secs(),
            message_count: conn.message_count,
            error_count: conn.error_count,
            rate_limited: conn.rate_limited,
        })
    }

    /// Send a Close frame to every connection, then clear the map.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops accepting new connections.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(Some(CloseFrame {
                code: CLOSE_NORMAL,
                reason: "server shutdown".into(),
            })));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Send a Ping frame to every connected client.
    pub async fn ping_all(&self) {
        let mut conns = self.connections.write().await;
        for conn in conns.values_mut() {
            conn.send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new(WsLimits::default())
    }
}
