//! GET /ws — the broadcast stream. Grounded on the teacher's per-connection
//! `tokio::select!` loop shape, trimmed of `ConnState::AwaitingConnect` and
//! the challenge/nonce handshake: a connection here is a pure observer, it
//! never authenticates and it never sends control frames of its own (those
//! go through the HTTP control surface instead).

use axum::{
    extract::{ws::Message, ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::info;

use agentctl_protocol::BroadcastEnvelope;

use crate::app::AppState;

/// Axum handler — upgrades HTTP to WebSocket at GET /ws.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_connection(socket, state))
}

/// Per-connection task — lives for the entire WS session lifetime. Each
/// connection registers its own observer with the broadcast fabric and
/// forwards every event it receives as a JSON text frame; it deregisters
/// on disconnect so the fabric stops buffering for it.
async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "new WS connection");

    let (mut tx, mut rx) = socket.split();
    let (observer_id, observer) = state.broadcast.register();

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    // Observers are read-only; any other inbound frame is ignored.
                    _ => {}
                }
            }

            event = observer.recv() => {
                let envelope = BroadcastEnvelope::new(&event);
                if tx.send(Message::Text(envelope.to_text_frame().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.broadcast.deregister(observer_id);
    info!(conn_id, "WS connection closed");
}
