use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use smartcam_core::commands::{ActionRequest, ManualPhotoRequest, ServoCommand, SERVO_CENTER};
use smartcam_core::protocol::{parse_inbound, BrowserInbound, InboundError, ServerMessage};

use crate::auth::jwt::validate_token;
use crate::control;
use crate::handlers::status::system_status;
use crate::middleware::auth::AuthUser;
use crate::middleware::client_ip::ClientIp;
use crate::state::AppState;
use crate::ws::manager::{ConnectionMeta, WsError};
use crate::ws::text_frame;

/// Time a new connection has to send its `authenticate` message.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Silence on the socket before the server pings.
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);

const CLOSE_AUTH_FAILED: u16 = 4001;
const CLOSE_POLICY_VIOLATION: u16 = 1008;
const CLOSE_NORMAL: u16 = 1000;

/// HTTP handler that upgrades `/ws` for a dashboard browser.
///
/// The browser authenticates with its JWT in the first message; only then is
/// the connection registered with `WsManager`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    client_ip: ClientIp,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, client_ip.0))
}

fn close(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

/// Wait for the `authenticate` message. `Err(None)` means the peer left.
async fn authenticate(
    socket: &mut WebSocket,
    state: &AppState,
    addr: &str,
) -> Result<AuthUser, Option<&'static str>> {
    let first = match tokio::time::timeout(AUTH_TIMEOUT, socket.recv()).await {
        Err(_) => return Err(Some("Authentication timeout")),
        Ok(None | Some(Err(_))) => return Err(None),
        Ok(Some(Ok(message))) => message,
    };

    let Message::Text(text) = first else {
        return Err(Some("Invalid authentication message"));
    };

    let token = match parse_inbound::<BrowserInbound>(text.as_str()) {
        Ok(BrowserInbound::Authenticate { token }) => token,
        Err(InboundError::InvalidJson) => return Err(Some("Invalid JSON")),
        Ok(_) | Err(_) => return Err(Some("Invalid authentication message")),
    };
    let token = token
        .filter(|t| !t.is_empty())
        .ok_or(Some("No token provided"))?;

    let claims = validate_token(&token, &state.config.jwt).map_err(|_| Some("Invalid token"))?;
    if let Some(bound_ip) = claims.ip.as_deref() {
        if bound_ip != addr {
            tracing::warn!(
                event = "session_hijacking_attempt",
                user_id = claims.sub,
                token_ip = %bound_ip,
                request_ip = %addr,
                "Token presented from a different address"
            );
            return Err(Some("Invalid token"));
        }
    }
    Ok(claims.into())
}

/// Manage a single dashboard connection after upgrade.
///
///   1. Authenticates the first message.
///   2. Registers the connection with `WsManager`.
///   3. Spawns a sender task that forwards messages from the manager channel.
///   4. Processes inbound messages on the current task.
///   5. Cleans up on disconnect.
async fn handle_socket(mut socket: WebSocket, state: AppState, addr: String) {
    let user = match authenticate(&mut socket, &state, &addr).await {
        Ok(user) => user,
        Err(Some(reason)) => {
            tracing::info!(addr = %addr, reason, "Dashboard WebSocket authentication failed");
            let _ = socket
                .send(text_frame(&ServerMessage::auth_failed(reason)))
                .await;
            let _ = socket.send(close(CLOSE_AUTH_FAILED, reason)).await;
            return;
        }
        Err(None) => return,
    };

    let conn_id = uuid::Uuid::new_v4().to_string();
    let meta = ConnectionMeta::web(user.user_id, user.username.clone(), addr.clone());
    let mut rx = match state.ws_manager.add(conn_id.clone(), meta).await {
        Ok(rx) => rx,
        Err(WsError::AtCapacity { .. }) => {
            let _ = socket
                .send(text_frame(&ServerMessage::error(
                    "Maximum WebSocket clients reached.",
                )))
                .await;
            let _ = socket
                .send(close(CLOSE_POLICY_VIOLATION, "Too many connections"))
                .await;
            return;
        }
    };
    tracing::info!(conn_id = %conn_id, user_id = user.user_id, addr = %addr, "WebSocket connected");

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let ws = &state.ws_manager;
    ws.send_to(
        &conn_id,
        text_frame(&ServerMessage::Authenticated {
            username: user.username.clone(),
            role: user.role.clone(),
        }),
    )
    .await;
    ws.send_to(&conn_id, text_frame(&ServerMessage::status(system_status(&state).await)))
        .await;

    let inactive_timeout = ws.limits().inactive_timeout;
    let mut last_inbound = Instant::now();

    loop {
        let next = match tokio::time::timeout(RECEIVE_TIMEOUT, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                let idle = last_inbound.elapsed();
                if idle > inactive_timeout {
                    tracing::info!(conn_id = %conn_id, idle_secs = idle.as_secs(), "Closing inactive WebSocket");
                    ws.send_to(&conn_id, text_frame(&ServerMessage::error("Inactive for too long")))
                        .await;
                    ws.send_to(&conn_id, close(CLOSE_NORMAL, "inactive")).await;
                    break;
                }
                ws.send_to(
                    &conn_id,
                    text_frame(&ServerMessage::ping_after(Some(idle.as_secs()))),
                )
                .await;
                continue;
            }
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                if !ws.touch(&conn_id).await {
                    ws.send_to(&conn_id, text_frame(&ServerMessage::error("Rate limit exceeded")))
                        .await;
                    continue;
                }
                last_inbound = Instant::now();
                if let Some(reply) = handle_message(&state, text.as_str()).await {
                    ws.send_to(&conn_id, text_frame(&reply)).await;
                }
            }
            Some(Ok(Message::Close(_))) => break,
            Some(Ok(Message::Pong(_))) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
            None => break,
        }
    }

    // Clean up: remove connection and let the sender flush a pending close.
    ws.remove(&conn_id).await;
    if tokio::time::timeout(Duration::from_secs(1), send_task).await.is_err() {
        tracing::debug!(conn_id = %conn_id, "Sender task did not finish in time");
    }
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

async fn handle_message(state: &AppState, text: &str) -> Option<ServerMessage> {
    let message = match parse_inbound::<BrowserInbound>(text) {
        Ok(message) => message,
        Err(InboundError::InvalidJson) => return None,
        Err(InboundError::UnknownType(_)) => {
            return Some(ServerMessage::status(system_status(state).await))
        }
        Err(err) => return Some(ServerMessage::error(err.to_string())),
    };

    match message {
        BrowserInbound::Ping => Some(ServerMessage::pong()),
        BrowserInbound::Pong => None,
        BrowserInbound::GetStatus | BrowserInbound::Authenticate { .. } => {
            Some(ServerMessage::status(system_status(state).await))
        }
        BrowserInbound::Command {
            command,
            servo1,
            servo2,
            action,
            intensity,
        } => Some(run_command(state, &command, servo1, servo2, action, intensity).await),
    }
}

async fn run_command(
    state: &AppState,
    command: &str,
    servo1: Option<i32>,
    servo2: Option<i32>,
    action: Option<String>,
    intensity: Option<u8>,
) -> ServerMessage {
    match command {
        "servo" => {
            let cmd = ServoCommand {
                servo1: servo1.unwrap_or(SERVO_CENTER),
                servo2: servo2.unwrap_or(SERVO_CENTER),
            };
            match control::apply_servo(state, cmd, "websocket").await {
                Ok((cmd, outcome)) => ServerMessage::ack(
                    "servo",
                    Some(format!("{} ({})", cmd.describe(), outcome.status())),
                ),
                Err(e) => ServerMessage::nack("servo", e.to_string()),
            }
        }
        "action" => {
            let request = ActionRequest {
                action: action.unwrap_or_default(),
                intensity,
            };
            let result = match request.resolve() {
                Ok((action, intensity)) => control::apply_action(state, action, intensity)
                    .await
                    .map(|outcome| (action, outcome)),
                Err(e) => Err(e.into()),
            };
            match result {
                Ok((action, outcome)) => ServerMessage::ack(
                    "action",
                    Some(format!("{action} ({})", outcome.status())),
                ),
                Err(e) => ServerMessage::nack("action", e.to_string()),
            }
        }
        "photo" => match control::request_photo(state, ManualPhotoRequest::default()).await {
            Ok(()) => ServerMessage::ack("photo", None),
            Err(e) => ServerMessage::nack("photo", e.to_string()),
        },
        other => ServerMessage::nack(other, "Unknown command"),
    }
}
