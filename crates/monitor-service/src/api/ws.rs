//! Websocket endpoint for live dashboard updates.

use crate::broadcaster::StreamMessage;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use telemetry::metrics::{MONITOR_BROADCAST_DROPPED, MONITOR_WS_CONNECTIONS};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    MONITOR_WS_CONNECTIONS.inc();
    info!("websocket client connected");

    let (mut sender, mut receiver) = socket.split();

    // One-shot status so the client can render immediately; history is
    // never replayed over the socket.
    let status = StreamMessage::SystemStatus {
        status: state.engine.status().await,
    };
    match serde_json::to_string(&status) {
        Ok(json) => {
            if sender.send(Message::Text(json)).await.is_err() {
                MONITOR_WS_CONNECTIONS.dec();
                return;
            }
        }
        Err(e) => warn!("failed to serialize status message: {}", e),
    }

    // Subscribe after the snapshot; updates published before it are not
    // replayed.
    let mut updates = state.broadcaster.subscribe();

    let send_task = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(message) => {
                    let json = match serde_json::to_string(&message) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("failed to serialize stream message: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    // Slow client: its oldest buffered updates were dropped
                    // instead of stalling other subscribers.
                    MONITOR_BROADCAST_DROPPED.inc_by(missed);
                    warn!(missed, "websocket client lagging, dropped updates");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Clients do not speak to us; drain frames until they close.
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => {
                    debug!("websocket client sent close");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    MONITOR_WS_CONNECTIONS.dec();
    info!("websocket client disconnected");
}
