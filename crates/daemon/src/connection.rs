//! WebSocket connection lifetime: accept, command loop, delivery loop,
//! close-path cleanup.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::dispatcher::{ConnState, ConnStateCell};
use crate::router::OutboundQueue;
use crate::server::AppState;

/// Drives one WebSocket session to completion. Spawned per upgrade.
pub async fn serve_socket(socket: WebSocket, state: AppState) {
    let id = Uuid::new_v4();
    let queue = Arc::new(OutboundQueue::new(state.config.outbound_queue_capacity));

    let conn_state = ConnStateCell::new();
    debug!(connection = %id, state = ?conn_state.get(), "registering connection");
    state.connections.insert(id, queue.clone());
    conn_state.set(ConnState::Open);
    info!(connection = %id, "websocket connection open");

    let (ws_tx, mut ws_rx) = socket.split();
    let ws_tx = Arc::new(Mutex::new(ws_tx));

    // Delivery task: drains the outbound queue into the socket. Ends when
    // the queue is closed or the peer stops accepting writes.
    let delivery = {
        let ws_tx = ws_tx.clone();
        let queue = queue.clone();
        let conn_state = conn_state.clone();
        tokio::spawn(async move {
            while let Some(event) = queue.pop().await {
                let text = match serde_json::to_string(&*event) {
                    Ok(text) => text,
                    Err(e) => {
                        debug!("failed to serialize event: {}", e);
                        continue;
                    }
                };
                if ws_tx.lock().await.send(Message::Text(text)).await.is_err() {
                    // Peer stopped accepting writes; reject anything still
                    // queued on the inbound side.
                    conn_state.set(ConnState::Closing);
                    break;
                }
            }
        })
    };

    // Command loop: one reply per inbound message, sent on the shared sink
    // so replies interleave safely with deliveries.
    while let Some(Ok(message)) = ws_rx.next().await {
        match message {
            Message::Text(text) => {
                let reply = state.dispatcher.dispatch_text(id, conn_state.get(), &text).await;
                if ws_tx
                    .lock()
                    .await
                    .send(Message::Text(reply.to_string()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Message::Close(_) => break,
            // Pings are answered by axum; binary frames are not part of the
            // protocol.
            _ => {}
        }
    }

    conn_state.set(ConnState::Closing);
    debug!(connection = %id, state = ?conn_state.get(), "tearing down");
    queue.close();
    state.connections.remove(&id);
    state.dispatcher.close_connection(id).await;
    delivery.abort();
    conn_state.set(ConnState::Closed);
    info!(
        connection = %id,
        state = ?conn_state.get(),
        dropped_events = queue.dropped_events(),
        "websocket connection closed"
    );
}
