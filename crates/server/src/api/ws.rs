//! WebSocket support for real-time job updates.
//!
//! Clients connecting to `/ws` receive the store's job change events as
//! JSON frames (`{"type": "updated", ...}` / `{"type": "removed", ...}`)
//! plus periodic heartbeats.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use spotnik_core::{JobEvent, JobStore};

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

/// Interval between server heartbeats.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe to job change events
    let mut rx = state.store().subscribe();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();

    info!("WebSocket client connected");

    // Forward job events and heartbeats to this client
    let send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            let event_type = match &event {
                                JobEvent::Updated { .. } => "updated",
                                JobEvent::Removed { .. } => "removed",
                            };
                            WS_MESSAGES_SENT.with_label_values(&[event_type]).inc();

                            match serde_json::to_string(&event) {
                                Ok(json) => {
                                    if sender.send(Message::Text(json.into())).await.is_err() {
                                        debug!("WebSocket send failed, client disconnected");
                                        break;
                                    }
                                }
                                Err(e) => {
                                    error!("Failed to serialize job event: {}", e);
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("WebSocket client lagged, skipped {} events", n);
                            WS_LAG_EVENTS.inc();
                            // Keep receiving, the client catches up on the next event
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("Event channel closed");
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    WS_MESSAGES_SENT.with_label_values(&["heartbeat"]).inc();
                    let frame = serde_json::json!({
                        "type": "heartbeat",
                        "timestamp": Utc::now().timestamp(),
                    });
                    if sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Handle incoming messages from the client (close, ping)
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Ping(data)) => {
                // Pong is handled automatically by axum
                debug!("Received ping: {:?}", data);
            }
            Ok(Message::Text(text)) => {
                // No client messages are expected, log and ignore
                debug!("Received text message: {}", text);
            }
            Ok(_) => {}
            Err(e) => {
                debug!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}
