use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use crate::state::AppState;
use crate::ws::hub::BroadcastHub;

/// HTTP handler that upgrades the connection to WebSocket.
///
/// After the upgrade the connection is registered with the hub and managed
/// by two tasks (sender + receiver).
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with the hub (which queues the welcome).
///   2. Spawns a sender task that forwards hub messages to the sink.
///   3. Feeds inbound text frames to the hub on the current task.
///   4. Cleans up on disconnect.
async fn handle_socket(socket: WebSocket, hub: Arc<BroadcastHub>) {
    let client_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(client_id = %client_id, "WebSocket connected");

    let mut rx = hub.connect(client_id.clone()).await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward hub messages to the WebSocket sink.
    let sender_client_id = client_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(client_id = %sender_client_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // Receiver loop: relay inbound messages through the hub.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                hub.handle_inbound(&client_id, &text).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(client_id = %client_id, "Pong received");
            }
            Ok(_) => {
                // Binary and Ping frames carry nothing for the protocol.
            }
            Err(e) => {
                tracing::debug!(client_id = %client_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Clean up: announce departure and abort the sender task.
    hub.disconnect(&client_id).await;
    send_task.abort();
    tracing::info!(client_id = %client_id, "WebSocket closed");
}
