//! WebSocket handler — one task per connection.
//!
//! DESIGN
//! ======
//! On upgrade the connection is admitted through the registry, which hands
//! its outbound queue to the room. The task then runs a `select!` loop:
//! - Incoming client frames → decode → submit to the room actor
//! - Frames queued by the room → write to the socket under a timeout
//! - Keepalive tick → ping, or close if the peer has gone quiet
//!
//! Malformed or unknown frames are logged and dropped; the connection
//! stays open and nothing is echoed back.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade (`Connecting` → `Open`, not yet joined)
//! 2. Admit → room queues `init`, broadcasts `user_joined` (joined)
//! 3. Read/write loop until peer close, socket error, write timeout, or
//!    the room releasing our queue (dispatcher eviction / replacement)
//! 4. Release from registry → room broadcasts `user_left` (`Closed`)

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, timeout};
use tracing::{debug, error, info, warn};

use crate::frame::{self, FRAME_CLIENT_ID, Frame, Inbound, Limits};
use crate::services::registry::Connection;
use crate::services::room::{RoomError, RoomHandle};
use crate::state::AppState;

/// Query parameters accepted on the websocket routes.
#[derive(Debug, Default, Deserialize)]
pub struct JoinParams {
    pub room: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum SendError {
    #[error("write timed out after {0:?}")]
    Timeout(Duration),
    #[error("socket error: {0}")]
    Socket(#[from] axum::Error),
}

// =============================================================================
// UPGRADE
// =============================================================================

/// `GET /ws`: server assigns the connection id.
pub async fn handle_ws(State(state): State<AppState>, Query(params): Query<JoinParams>, ws: WebSocketUpgrade) -> Response {
    upgrade(state, ws, None, params.room)
}

/// `GET /ws/{client_id}`: client proposes its own id.
pub async fn handle_ws_with_id(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    Query(params): Query<JoinParams>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(state, ws, Some(client_id), params.room)
}

fn upgrade(state: AppState, ws: WebSocketUpgrade, candidate: Option<String>, room: Option<String>) -> Response {
    ws.max_message_size(state.config.max_message_bytes)
        .on_failed_upgrade(|e| {
            warn!(error = %e, "ws: upgrade failed");
        })
        .on_upgrade(move |socket| run_ws(socket, state, candidate, room))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, candidate: Option<String>, room: Option<String>) {
    // Bounded: a member that cannot keep up is evicted by the room, not buffered forever.
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(state.config.client_buffer);

    let (conn, room) = match state.registry.admit(candidate.as_deref(), room.as_deref(), client_tx).await {
        Ok(admitted) => admitted,
        Err(e) => {
            error!(error = %e, "ws: admission failed");
            return;
        }
    };
    info!(client_id = %conn.id, room = %conn.room, "ws: client connected");

    let limits = state.limits();
    let send_timeout = state.config.send_timeout;
    let ping_period = state.config.ping_interval;
    let mut keepalive = ping_period.map(|period| {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                last_seen = Instant::now();
                match msg {
                    Message::Text(text) => {
                        if let Err(e) = process_inbound_text(&room, &conn, limits, text.as_str()).await {
                            error!(client_id = %conn.id, error = %e, "ws: room unavailable");
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            frame = client_rx.recv() => {
                // The room dropped our queue: evicted as unresponsive or replaced.
                let Some(frame) = frame else {
                    info!(client_id = %conn.id, "ws: released by room");
                    break;
                };
                if let Err(e) = send_frame(&mut socket, &frame, send_timeout).await {
                    warn!(client_id = %conn.id, kind = frame.kind(), error = %e, "ws: send failed");
                    break;
                }
            }
            () = keepalive_tick(keepalive.as_mut()) => {
                let Some(period) = ping_period else { continue };
                if last_seen.elapsed() > period * 2 {
                    warn!(client_id = %conn.id, "ws: keepalive timed out");
                    break;
                }
                if !matches!(timeout(send_timeout, socket.send(Message::Ping(Bytes::new()))).await, Ok(Ok(()))) {
                    break;
                }
            }
        }
    }

    // Closing: nothing more is read. Eviction announces the departure.
    if let Err(e) = state.registry.release(&conn).await {
        error!(client_id = %conn.id, error = %e, "ws: release failed");
    }
    let _ = timeout(send_timeout, socket.send(Message::Close(None))).await;
    info!(client_id = %conn.id, room = %conn.room, "ws: client disconnected");
}

async fn keepalive_tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Decode one inbound text frame and submit it to the room.
///
/// Frames that fail to decode are dropped here. Only a stopped room is an
/// error, and it ends the connection.
async fn process_inbound_text(room: &RoomHandle, conn: &Connection, limits: Limits, text: &str) -> Result<(), RoomError> {
    let inbound = match frame::decode(text, limits) {
        Ok(inbound) => inbound,
        Err(e) => {
            debug!(client_id = %conn.id, error = %e, "ws: dropped inbound frame");
            return Ok(());
        }
    };

    match inbound {
        Inbound::Draw(stroke) => room.append(conn.id.clone(), conn.session, stroke).await,
        Inbound::Clear => room.clear(conn.id.clone(), conn.session).await,
        Inbound::Cursor(mut data) => {
            data.insert(FRAME_CLIENT_ID.into(), serde_json::Value::String(conn.id.clone()));
            room.relay(conn.id.clone(), conn.session, Frame::Cursor(data)).await
        }
        Inbound::DrawProgress(data) => room.relay(conn.id.clone(), conn.session, Frame::DrawProgress(data)).await,
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame, send_timeout: Duration) -> Result<(), SendError> {
    let text = match frame.to_text() {
        Ok(text) => text,
        Err(e) => {
            error!(kind = frame.kind(), error = %e, "ws: failed to encode frame");
            return Ok(());
        }
    };
    timeout(send_timeout, socket.send(Message::Text(text.into())))
        .await
        .map_err(|_| SendError::Timeout(send_timeout))??;
    Ok(())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
