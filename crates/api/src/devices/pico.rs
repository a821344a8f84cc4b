//! Pico servo-controller session at `/ws/pico`.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use smartcam_core::device::DeviceKind;
use smartcam_core::protocol::{parse_inbound, sensor_sequence, InboundError, PicoInbound, ServerMessage};
use tokio::sync::mpsc;

use super::{authenticate_device, persist_log, reject_socket, SensorReading};
use crate::middleware::client_ip::ClientIp;
use crate::state::AppState;
use crate::ws::text_frame;

/// Silence on the socket before the server pings.
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(300);

/// How often the keep-alive task looks at the idle clock.
const KEEPALIVE_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Sensor data this recent means the device is actively streaming.
const SENSOR_ACTIVE_WINDOW: Duration = Duration::from_secs(60);

const MESSAGE_LOG_EVERY: u64 = 100;
const SENSOR_LOG_EVERY: u64 = 1000;

/// Idle time after which the keep-alive task pings, given how long the
/// session has been idle and when sensor data last arrived.
///
/// `None` means no ping is due at this idle level.
pub fn keepalive_threshold(idle: Duration, since_sensor: Option<Duration>) -> Option<Duration> {
    if since_sensor.is_some_and(|s| s < SENSOR_ACTIVE_WINDOW) {
        Some(Duration::from_secs(300))
    } else if idle > Duration::from_secs(900) {
        Some(Duration::from_secs(60))
    } else if idle > Duration::from_secs(300) {
        Some(Duration::from_secs(120))
    } else {
        None
    }
}

/// Whether the keep-alive task should ping now.
pub fn keepalive_due(idle: Duration, since_sensor: Option<Duration>) -> bool {
    keepalive_threshold(idle, since_sensor).is_some_and(|threshold| idle >= threshold)
}

struct Activity {
    last_message: Instant,
    last_sensor: Option<Instant>,
}

/// Per-session bookkeeping for the receive loop.
struct PicoSession {
    id: String,
    state: AppState,
    activity: Arc<Mutex<Activity>>,
    message_count: u64,
    sensor_count: u64,
    connect_acked: bool,
}

/// Upgrade `/ws/pico`. Authentication happens after the upgrade so a
/// rejected device receives a close code it can act on.
pub async fn pico_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    client_ip: ClientIp,
    headers: HeaderMap,
) -> impl IntoResponse {
    let auth = authenticate_device(DeviceKind::Pico, &headers, &client_ip, &state.config.devices);
    ws.on_upgrade(move |socket| async move {
        match auth {
            Ok(()) => run_session(socket, state, client_ip.0).await,
            Err(err) => reject_socket(socket, DeviceKind::Pico, err).await,
        }
    })
}

async fn run_session(socket: WebSocket, state: AppState, addr: String) {
    let session_id = uuid::Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let (mut sink, mut stream) = socket.split();

    state.devices.pico.attach(&session_id, tx.clone(), &addr);
    tracing::info!(session_id = %session_id, addr = %addr, "Pico connected");
    persist_log(&state.pool, &format!("Pico connected from {addr}"), "info", "pico").await;

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_session = session_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(session_id = %sender_session, "Pico sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let _ = tx.send(text_frame(&ServerMessage::connection_ack("Pico connected")));

    let activity = Arc::new(Mutex::new(Activity {
        last_message: Instant::now(),
        last_sensor: None,
    }));
    let keepalive_task = spawn_keepalive(session_id.clone(), tx.clone(), activity.clone());

    let mut session = PicoSession {
        id: session_id.clone(),
        state: state.clone(),
        activity,
        message_count: 0,
        sensor_count: 0,
        connect_acked: false,
    };

    loop {
        let next = match tokio::time::timeout(RECEIVE_TIMEOUT, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                tracing::debug!(session_id = %session_id, "Pico quiet, sending ping");
                let _ = tx.send(text_frame(&ServerMessage::ping()));
                continue;
            }
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                if let Some(reply) = session.handle_text(text.as_str()).await {
                    let _ = tx.send(text_frame(&reply));
                }
            }
            Some(Ok(Message::Binary(data))) => {
                tracing::trace!(session_id = %session_id, len = data.len(), "Ignoring binary message from Pico");
                session.touch();
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => session.touch(),
            Some(Ok(Message::Close(frame))) => {
                tracing::debug!(session_id = %session_id, ?frame, "Pico sent close");
                break;
            }
            Some(Err(e)) => {
                tracing::debug!(session_id = %session_id, error = %e, "Pico receive error");
                break;
            }
            None => break,
        }
    }

    keepalive_task.abort();
    send_task.abort();
    if state.devices.pico.detach(&session_id) {
        persist_log(&state.pool, "Pico disconnected", "info", "pico").await;
    }
    tracing::info!(
        session_id = %session_id,
        messages = session.message_count,
        "Pico disconnected"
    );
}

fn spawn_keepalive(
    session_id: String,
    tx: mpsc::UnboundedSender<Message>,
    activity: Arc<Mutex<Activity>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(KEEPALIVE_CHECK_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let (idle, since_sensor) = {
                let a = activity.lock().unwrap_or_else(|p| p.into_inner());
                (a.last_message.elapsed(), a.last_sensor.map(|s| s.elapsed()))
            };
            if keepalive_due(idle, since_sensor) {
                tracing::debug!(session_id = %session_id, idle_secs = idle.as_secs(), "Pico keep-alive ping");
                if tx
                    .send(text_frame(&ServerMessage::ping_after(Some(idle.as_secs()))))
                    .is_err()
                {
                    break;
                }
            }
        }
    })
}

impl PicoSession {
    fn touch(&mut self) {
        self.state.devices.pico.mark_seen();
        self.activity
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .last_message = Instant::now();
    }

    /// Handle one text frame, returning the reply to send (if any).
    async fn handle_text(&mut self, text: &str) -> Option<ServerMessage> {
        self.touch();
        self.message_count += 1;
        if self.message_count % MESSAGE_LOG_EVERY == 0 {
            tracing::info!(session_id = %self.id, count = self.message_count, "Pico messages received");
        }

        let message = match parse_inbound::<PicoInbound>(text) {
            Ok(message) => message,
            Err(err @ (InboundError::InvalidJson | InboundError::UnknownType(_))) => {
                tracing::debug!(session_id = %self.id, error = %err, "Bad Pico message");
                return Some(ServerMessage::error(err.to_string()));
            }
            Err(err) => {
                tracing::warn!(session_id = %self.id, error = %err, "Malformed Pico message");
                return Some(ServerMessage::error(err.to_string()));
            }
        };

        match message {
            PicoInbound::Ping => Some(ServerMessage::pong()),
            PicoInbound::Pong => {
                tracing::trace!(session_id = %self.id, "Pico pong");
                None
            }
            PicoInbound::Connect { device, version } => {
                tracing::info!(
                    session_id = %self.id,
                    device = device.as_deref().unwrap_or("pico"),
                    version = version.as_deref().unwrap_or("unknown"),
                    "Pico identified"
                );
                if self.connect_acked {
                    None
                } else {
                    self.connect_acked = true;
                    Some(ServerMessage::connection_ack("Pico connected"))
                }
            }
            PicoInbound::Servo { command } => {
                let command = command.clamped();
                tracing::debug!(session_id = %self.id, servo1 = command.servo1, servo2 = command.servo2, "Pico servo report");
                Some(ServerMessage::ack("servo", Some(command.describe())))
            }
            PicoInbound::Log { message, level } => {
                tracing::debug!(session_id = %self.id, level = %level, message = %message, "Pico log");
                persist_log(&self.state.pool, &message, &level, "pico").await;
                None
            }
            PicoInbound::Ack {
                command_type,
                status,
            } => {
                tracing::debug!(
                    session_id = %self.id,
                    command_type = command_type.as_deref().unwrap_or("unknown"),
                    status = status.as_deref().unwrap_or("unknown"),
                    "Pico acknowledged command"
                );
                None
            }
            PicoInbound::Test { message } => {
                tracing::info!(session_id = %self.id, message = message.as_deref().unwrap_or(""), "Pico test message");
                None
            }
            PicoInbound::SensorData { sensor_type, data } => {
                let sequence = sensor_sequence(&data);
                self.activity
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .last_sensor = Some(Instant::now());
                self.sensor_count += 1;
                if self.sensor_count % SENSOR_LOG_EVERY == 0 {
                    tracing::info!(session_id = %self.id, count = self.sensor_count, "Pico sensor samples received");
                }
                self.state.devices.push_sensor(SensorReading {
                    sensor_type: sensor_type.clone(),
                    sequence,
                    data,
                    received_at: chrono::Utc::now(),
                });
                Some(ServerMessage::sensor_ack(sensor_type, sequence))
            }
        }
    }
}
