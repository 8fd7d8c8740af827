//! WebSocket Connection Handler
//!
//! Handles individual presence connections: one read loop per socket plus a
//! writer task that forwards broadcaster updates and direct replies in order.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap},
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::messages::{GatewayReceive, GatewaySend, OpCode};
use super::session::ConnectionState;
use crate::application::services::{PresenceService, PresenceUpdate};
use crate::domain::{ConnectionInfo, SessionId};
use crate::startup::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let info = connection_info(&headers, peer);
    let limits = &state.settings.websocket;

    ws.max_message_size(limits.max_message_size)
        .max_frame_size(limits.max_frame_size)
        .on_upgrade(move |socket| handle_socket(socket, state, info))
}

/// Extract informational metadata from the upgrade request
fn connection_info(headers: &HeaderMap, peer: SocketAddr) -> ConnectionInfo {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let client_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    ConnectionInfo {
        remote_address: Some(forwarded.unwrap_or_else(|| peer.ip().to_string())),
        client_agent,
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState, info: ConnectionInfo) {
    // Split socket for concurrent read/write
    let (mut sender, mut receiver) = socket.split();

    let connection = match state.presence.connect(info).await {
        Ok(connection) => connection,
        Err(e) => {
            tracing::warn!(error = %e, "Refusing gateway connection");
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::AGAIN,
                    reason: Utf8Bytes::from_static("presence unavailable, retry later"),
                })))
                .await;
            return;
        }
    };

    let session_id = connection.session_id;
    let mut conn_state = ConnectionState::new(session_id);

    // Hello goes out before any queued presence update
    let hello = GatewaySend::hello(session_id, state.settings.websocket.heartbeat_interval_ms);
    if let Err(e) = send_frame(&mut sender, &hello).await {
        tracing::debug!(session_id = %session_id, error = %e, "Failed to send Hello");
        state.presence.disconnect(session_id).await;
        return;
    }

    // Channel for direct replies (heartbeat ACKs), bounded like the update queue
    let (reply_tx, reply_rx) =
        mpsc::channel::<GatewaySend>(state.settings.presence.outbound_buffer.max(1));
    let mut writer = tokio::spawn(write_loop(sender, connection.updates, reply_rx, session_id));

    // Main message loop
    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = handle_message(
                            text.as_str(),
                            &mut conn_state,
                            &reply_tx,
                            &state.presence,
                        ).await {
                            tracing::debug!(
                                session_id = %session_id,
                                error = %e,
                                "Error handling message"
                            );
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(session_id = %session_id, "Connection closed");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::debug!(session_id = %session_id, error = %e, "WebSocket error");
                        break;
                    }
                    // Pong is handled automatically by axum
                    Some(Ok(_)) => {}
                }
            }

            // Writer stops when the socket refuses writes or the session was swept
            _ = &mut writer => {
                tracing::debug!(session_id = %session_id, "Writer stopped");
                break;
            }
        }
    }

    // Cleanup
    writer.abort();
    state.presence.disconnect(session_id).await;

    tracing::debug!(
        session_id = %session_id,
        heartbeats = conn_state.heartbeats,
        uptime_secs = conn_state.uptime().as_secs(),
        last_heartbeat_secs_ago = conn_state.last_heartbeat.map(|t| t.elapsed().as_secs()),
        "Gateway connection finished"
    );
}

/// Forward presence updates and replies to the socket, in arrival order
async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut updates: mpsc::Receiver<PresenceUpdate>,
    mut replies: mpsc::Receiver<GatewaySend>,
    session_id: SessionId,
) {
    loop {
        let frame = tokio::select! {
            update = updates.recv() => match update {
                Some(update) => GatewaySend::presence(update),
                None => {
                    // Broadcaster dropped this connection's queue
                    tracing::debug!(session_id = %session_id, "Presence subscription ended");
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::NORMAL,
                            reason: Utf8Bytes::from_static("session expired"),
                        })))
                        .await;
                    return;
                }
            },
            reply = replies.recv() => match reply {
                Some(reply) => reply,
                None => return,
            },
        };

        if let Err(e) = send_frame(&mut sender, &frame).await {
            tracing::debug!(session_id = %session_id, error = %e, "Failed to write frame");
            return;
        }
    }
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &GatewaySend,
) -> Result<(), axum::Error> {
    let text = match frame.to_text() {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize message");
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}

/// Handle incoming WebSocket message
async fn handle_message(
    text: &str,
    conn_state: &mut ConnectionState,
    tx: &mpsc::Sender<GatewaySend>,
    presence: &PresenceService,
) -> Result<(), String> {
    let payload: GatewayReceive =
        serde_json::from_str(text).map_err(|e| format!("Invalid JSON: {}", e))?;

    match OpCode::from_u8(payload.op) {
        Some(OpCode::Heartbeat) => {
            conn_state.heartbeat();
            presence.heartbeat(conn_state.session_id).await;
            queue_reply(tx, GatewaySend::heartbeat_ack(), conn_state.session_id);
        }

        Some(OpCode::RequestPresence) => {
            presence.request_count(conn_state.session_id).await;
        }

        _ => {
            tracing::debug!(
                session_id = %conn_state.session_id,
                op = payload.op,
                "Unknown opcode"
            );
        }
    }

    Ok(())
}

/// Queue a direct reply without waiting on a stalled writer.
///
/// Returns false when the reply was dropped.
fn queue_reply(tx: &mpsc::Sender<GatewaySend>, frame: GatewaySend, session_id: SessionId) -> bool {
    match tx.try_send(frame) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(session_id = %session_id, "Reply dropped, outbound queue full");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}
