//! WebSocket Connection Management - Session lifecycle over one socket
//!
//! The socket is split in two tasks:
//! - the reader drives the [`Session`] with inbound frames
//! - the writer owns the sink and merges the subscribed group streams with the
//!   session's own signals
//!
//! The writer pings the client every half idle window. Any inbound frame, pongs included,
//! resets the reader's idle timer, so only a peer that stopped answering is timed out.
//!
//! Cleanup (group release, room presence, global presence) runs after both stopped,
//! even when the reader panicked.

use crate::core::AppState;
use crate::core::auth::Identity;
use crate::dtos::{ErrorFrame, ServerEvent};
use crate::fanout::{FanoutBus, GroupName};
use crate::ws::close_codes;
use crate::ws::event_handlers::Session;
use crate::ws::registry::InternalSignal;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures::FutureExt;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_stream::StreamMap;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, error, info, instrument, warn};

#[instrument(skip(ws, state, identity, auto_join), fields(user_id = identity.user_id))]
pub async fn handle_socket(
    ws: WebSocket,
    state: Arc<AppState>,
    identity: Identity,
    auto_join: Option<String>,
) {
    info!("WebSocket connection established");

    let (ws_tx, ws_rx) = ws.split();
    let (int_tx, int_rx) = unbounded_channel::<InternalSignal>();
    let session_id = state.sessions.register(identity.user_id, int_tx.clone());

    let writer = tokio::spawn(write_ws(
        identity.user_id,
        ws_tx,
        int_rx,
        state.bus.clone(),
        ping_interval(state.ws_idle_timeout),
    ));

    let mut session = Session::new(state.clone(), identity, int_tx);

    let outcome = AssertUnwindSafe(run_session(&mut session, ws_rx, auto_join, &state))
        .catch_unwind()
        .await;
    if outcome.is_err() {
        error!("Session task panicked, running cleanup");
    }

    session.signal(InternalSignal::Shutdown);
    if let Err(e) = writer.await {
        error!("Write task failed: {:?}", e);
    }
    session.close().await;
    state.sessions.remove(&session_id);
}

async fn run_session(
    session: &mut Session,
    ws_rx: SplitStream<WebSocket>,
    auto_join: Option<String>,
    state: &AppState,
) {
    if let Err(e) = session.activate().await {
        error!("Session activation failed: {}", e);
        session.signal(InternalSignal::Close(close_codes::INTERNAL, "Server error"));
        return;
    }

    if let Some(room_id) = auto_join {
        if let Err(code) = session.auto_join(&room_id).await {
            let reason = match code {
                close_codes::NOT_FOUND => "Room not found",
                close_codes::FORBIDDEN => "Not authorized to join this room",
                _ => "Server error",
            };
            session.signal(InternalSignal::Close(code, reason));
            return;
        }
    }

    listen_ws(session, ws_rx, state).await;
}

#[instrument(skip(session, websocket_rx, state))]
pub async fn listen_ws(
    session: &mut Session,
    mut websocket_rx: SplitStream<WebSocket>,
    state: &AppState,
) {
    debug!("Listen task started");
    let idle = state.ws_idle_timeout;

    loop {
        match timeout(idle, StreamExt::next(&mut websocket_rx)).await {
            Ok(Some(Ok(Message::Text(text)))) => session.handle_text(text.as_str()).await,
            Ok(Some(Ok(Message::Binary(_)))) => {
                session.signal(InternalSignal::Error("Invalid JSON format".to_string()));
            }
            Ok(Some(Ok(Message::Close(_)))) => {
                info!("Close message received");
                break;
            }
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(e))) => {
                warn!("WebSocket error: {:?}", e);
                break;
            }
            Ok(None) => {
                info!("WebSocket stream ended");
                break;
            }
            Err(_) => {
                warn!(timeout_secs = idle.as_secs(), "Connection idle timeout");
                session.signal(InternalSignal::Close(1000, "Idle timeout"));
                break;
            }
        }
    }
    debug!("Listen task terminated");
}

/// Keep-alive period for a given idle window
pub fn ping_interval(idle_timeout: Duration) -> Duration {
    (idle_timeout / 2).max(Duration::from_millis(100))
}

#[instrument(skip(websocket_tx, internal_rx, bus))]
pub async fn write_ws(
    user_id: i32,
    mut websocket_tx: SplitSink<WebSocket, Message>,
    mut internal_rx: UnboundedReceiver<InternalSignal>,
    bus: Arc<dyn FanoutBus>,
    ping_every: Duration,
) {
    debug!("Write task started");
    let mut stream_map: StreamMap<GroupName, BroadcastStream<Arc<ServerEvent>>> =
        StreamMap::new();
    let mut keepalive = interval_at(Instant::now() + ping_every, ping_every);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = keepalive.tick() => {
                if websocket_tx.send(Message::Ping(Default::default())).await.is_err() {
                    warn!("Failed to send ping, closing connection");
                    break;
                }
            }

            Some((group, result)) = tokio_stream::StreamExt::next(&mut stream_map) => {
                match result {
                    Ok(event) => {
                        if event.is_suppressed_for(user_id) {
                            continue;
                        }
                        if send_json(&mut websocket_tx, event.as_ref()).await.is_err() {
                            warn!("Failed to send event, closing connection");
                            break;
                        }
                    }
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(group = %group, skipped, "Subscriber lagged, events skipped");
                    }
                }
            }

            signal = internal_rx.recv() => {
                match signal {
                    Some(InternalSignal::Frame(event)) => {
                        if send_json(&mut websocket_tx, &event).await.is_err() {
                            break;
                        }
                    }
                    Some(InternalSignal::Error(message)) => {
                        debug!(error_message = %message, "Sending error frame to client");
                        if send_json(&mut websocket_tx, &ErrorFrame::new(message)).await.is_err() {
                            break;
                        }
                    }
                    Some(InternalSignal::Subscribe(group, rx)) => {
                        debug!(group = %group, "Adding group subscription");
                        stream_map.insert(group, BroadcastStream::new(rx));
                    }
                    Some(InternalSignal::Unsubscribe(group)) => {
                        debug!(group = %group, "Removing group subscription");
                        stream_map.remove(&group);
                        if let Err(e) = bus.release(&group).await {
                            warn!(group = %group, "Group release failed: {}", e);
                        }
                    }
                    Some(InternalSignal::Close(code, reason)) => {
                        info!(code, reason, "Closing connection");
                        let frame = CloseFrame { code, reason: Utf8Bytes::from(reason) };
                        let _ = websocket_tx.send(Message::Close(Some(frame))).await;
                        break;
                    }
                    Some(InternalSignal::Shutdown) | None => break,
                }
            }
        }
    }

    // receivers go away with the map; the session releases the groups afterwards
    drop(stream_map);
    let _ = websocket_tx.close().await;
    debug!("Write task terminated");
}

async fn send_json<T: Serialize>(
    websocket_tx: &mut SplitSink<WebSocket, Message>,
    payload: &T,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(payload).map_err(|e| {
        error!("Failed to serialize frame: {:?}", e);
        axum::Error::new(e)
    })?;
    websocket_tx.send(Message::Text(Utf8Bytes::from(json))).await
}

/// Close a socket that never became a session
pub async fn reject(mut ws: WebSocket, code: u16, reason: &'static str) {
    info!(code, reason, "Rejecting WebSocket connection");
    let frame = CloseFrame {
        code,
        reason: Utf8Bytes::from(reason),
    };
    if let Err(e) = ws.send(Message::Close(Some(frame))).await {
        debug!("Close frame not delivered: {:?}", e);
    }
}
