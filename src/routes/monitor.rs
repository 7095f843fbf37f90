//! # routes::monitor
//!
//! **Monitor stream** for the dashboard.
//!
//! | Method   | Path          | Description                         |
//! |----------|---------------|-------------------------------------|
//! | GET (WS) | `/ws/monitor` | Real-time `WsEvent` JSON stream     |
//!
//! A client gets a `SNAPSHOT` frame with the full current view on connect,
//! then every broadcast event as it happens.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::state::SharedState;

// ─── WebSocket Handler ────────────────────────────────────────────────────────

pub async fn ws_monitor(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// The `SNAPSHOT` frame sent right after the upgrade.
pub async fn snapshot_frame(state: &SharedState) -> String {
    let (session_id, group, view, errors) = {
        let session = state.session.read().await;
        (
            session.id(),
            session.group().map(str::to_string),
            session.current_view(),
            session.errors().clone(),
        )
    };
    let stats = state.stats().await;

    json!({
        "event":      "SNAPSHOT",
        "session_id": session_id,
        "group":      group,
        "view":       view,
        "errors":     errors,
        "stats":      stats,
    })
    .to_string()
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    // Subscribe before building the snapshot so no event falls in between.
    let mut rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("🔌 WebSocket client connected");

    let snapshot = snapshot_frame(&state).await;
    if sender.send(Message::Text(snapshot)).await.is_err() {
        return;
    }

    // ── Event Loop ────────────────────────────────────────────────────────────
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(json_str) => {
                        if sender.send(Message::Text(json_str)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!("WS client lagged, skipped {n} events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("🔌 WebSocket client disconnected");
}
