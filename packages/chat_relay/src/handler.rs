//! WebSocket Handler
//!
//! One task per client connection. Frames are read, routed and answered one
//! at a time; a separate sender drains the outbound queue into the socket.

use axum::extract::ws::{Message, WebSocket};
use chatgpt_client::ChatBackend;
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dispatch::MessageRouter;
use crate::protocol::OutboundFrame;
use crate::server::AppState;

/// Serve one upgraded connection until the client leaves or the socket fails.
pub async fn handle_socket<B: ChatBackend>(socket: WebSocket, state: AppState<B>) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %connection_id, "Client connected");
    state.metrics.connection_opened();

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(state.send_channel_capacity);

    let metrics_send = state.metrics.clone();
    let conn_send = connection_id.clone();
    let sender_task = async move {
        while let Some(frame) = rx.recv().await {
            let json = match frame.to_json() {
                Ok(j) => j,
                Err(e) => {
                    error!(conn_id = %conn_send, "Failed to serialize frame: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                return;
            }
            metrics_send.frame_sent();
        }
        // Queue drained; flush anything pending, including the close handshake.
        let _ = ws_sender.close().await;
    };

    let mut router = MessageRouter::new(
        state.backend.clone(),
        state.call_timeout,
        state.metrics.clone(),
        connection_id.clone(),
    );
    let metrics_recv = state.metrics.clone();
    let conn_recv = connection_id.clone();
    let input_task = async move {
        while let Some(msg) = ws_receiver.next().await {
            let reply = match msg {
                Ok(Message::Text(text)) => {
                    metrics_recv.frame_received();
                    router.handle_text(text.as_str()).await
                }
                Ok(Message::Binary(bytes)) => {
                    metrics_recv.frame_received();
                    router.handle_binary(&bytes).await
                }
                Ok(Message::Close(_)) => {
                    debug!(conn_id = %conn_recv, "Client closed connection");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(conn_id = %conn_recv, "WebSocket error: {}", e);
                    break;
                }
            };
            if tx.send(reply).await.is_err() {
                break;
            }
        }
        router.close();
        debug!(conn_id = %conn_recv, state = ?router.state(), "Router finished");
    };

    // The input task owns `tx`. Once it returns, the sender writes what is
    // still queued and then closes the sink.
    tokio::pin!(sender_task);
    tokio::select! {
        _ = &mut sender_task => debug!(conn_id = %connection_id, "Sender task ended"),
        _ = input_task => {
            debug!(conn_id = %connection_id, "Input task ended, draining replies");
            sender_task.await;
        }
    }

    state.metrics.connection_closed();
    info!(conn_id = %connection_id, "Client disconnected");
}
