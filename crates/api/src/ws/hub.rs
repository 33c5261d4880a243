//! Connection registry and fan-out for realtime collaboration.
//!
//! [`BroadcastHub`] owns every live WebSocket connection and implements the
//! wire protocol: a welcome on connect, join/leave announcements, and
//! fan-out of client messages to everyone except their sender. The socket
//! plumbing (upgrade, split, pumps) lives in the handler; the hub only sees
//! client ids, raw frames, and per-connection outbound channels, which keeps
//! the protocol unit-testable without a network.

use std::collections::HashMap;

use annolab_core::realtime::{now_millis, Envelope, MessageType};
use axum::body::Bytes;
use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};

/// Greeting sent to a client in its welcome message.
const WELCOME_MESSAGE: &str = "Connected to annotation platform";

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single WebSocket connection.
pub struct ClientConnection {
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    /// When this connection was established.
    pub connected_at: annolab_core::types::Timestamp,
}

/// Manages all active WebSocket connections and the broadcast protocol.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
pub struct BroadcastHub {
    clients: RwLock<HashMap<String, ClientConnection>>,
}

impl BroadcastHub {
    /// Create a new, empty hub.
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new client.
    ///
    /// The new client receives a `user_joined` welcome addressed to itself
    /// (carrying its assigned id), and every other client is told the
    /// newcomer joined. Returns the receiver half of the outbound channel
    /// so the caller can pump messages to the socket sink.
    pub async fn connect(&self, client_id: String) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();

        let welcome = Envelope {
            kind: MessageType::UserJoined,
            payload: serde_json::json!({
                "id": client_id,
                "message": WELCOME_MESSAGE,
            }),
            sender: None,
            timestamp: Some(now_millis()),
        };
        // Welcome only the new client; the receiver is not yet pumping, so
        // the frame queues in the channel until the handler starts.
        let _ = tx.send(encode(&welcome));

        let conn = ClientConnection {
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.clients.write().await.insert(client_id.clone(), conn);

        let joined = Envelope {
            kind: MessageType::UserJoined,
            payload: serde_json::json!({ "id": client_id }),
            sender: None,
            timestamp: Some(now_millis()),
        };
        self.send_except(&client_id, encode(&joined)).await;

        tracing::info!(client_id = %client_id, "Client connected");
        rx
    }

    /// Remove a client and announce its departure to everyone remaining.
    ///
    /// Safe to call twice; the second call finds nothing to remove and
    /// announces nothing.
    pub async fn disconnect(&self, client_id: &str) {
        let removed = self.clients.write().await.remove(client_id);
        if removed.is_none() {
            return;
        }

        let left = Envelope {
            kind: MessageType::UserLeft,
            payload: serde_json::json!({ "id": client_id }),
            sender: None,
            timestamp: Some(now_millis()),
        };
        self.send_except(client_id, encode(&left)).await;
        tracing::info!(client_id = %client_id, "Client disconnected");
    }

    /// Process a raw text frame from a client.
    ///
    /// Well-formed envelopes are stamped with the sending client's id and
    /// the hub's clock, then fanned out to every other client. Malformed
    /// frames are logged and dropped; the connection stays up.
    pub async fn handle_inbound(&self, client_id: &str, raw: &str) {
        let mut envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(client_id = %client_id, error = %e, "Dropping malformed message");
                return;
            }
        };

        // The hub is authoritative for attribution and ordering; whatever
        // the client claimed is overwritten.
        envelope.sender = Some(client_id.to_string());
        envelope.timestamp = Some(now_millis());
        self.send_except(client_id, encode(&envelope)).await;
    }

    /// Broadcast a system envelope to every connected client.
    ///
    /// Used by the job event relay; the envelope is stamped here.
    pub async fn publish(&self, mut envelope: Envelope) {
        envelope.timestamp = Some(now_millis());
        let message = encode(&envelope);
        let clients = self.clients.read().await;
        for conn in clients.values() {
            let _ = conn.sender.send(message.clone());
        }
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Send a Ping frame to every connected client.
    ///
    /// Used by the heartbeat task to keep connections alive and detect
    /// stale ones.
    pub async fn ping_all(&self) {
        let clients = self.clients.read().await;
        for conn in clients.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }

    /// Send a Close frame to every connection, then clear the map.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops accepting new connections.
    pub async fn shutdown_all(&self) {
        let mut clients = self.clients.write().await;
        let count = clients.len();
        for conn in clients.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        clients.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Send to every client except `excluded`. Connections whose channels
    /// are closed are silently skipped (they will be cleaned up by their
    /// own receive loop).
    async fn send_except(&self, excluded: &str, message: Message) {
        let clients = self.clients.read().await;
        for (id, conn) in clients.iter() {
            if id != excluded {
                let _ = conn.sender.send(message.clone());
            }
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize an envelope into a text frame.
fn encode(envelope: &Envelope) -> Message {
    // Envelope contains only JSON-representable fields.
    let text = serde_json::to_string(envelope).expect("envelope serialization cannot fail");
    Message::Text(text.into())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;

    /// Drain and decode every frame currently queued for a client.
    fn drain(rx: &mut UnboundedReceiver<Message>) -> Vec<Envelope> {
        let mut envelopes = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let Message::Text(text) = msg {
                envelopes.push(Envelope::parse(&text).unwrap());
            }
        }
        envelopes
    }

    #[tokio::test]
    async fn new_client_gets_welcome_with_own_id() {
        let hub = BroadcastHub::new();
        let mut rx = hub.connect("c1".to_string()).await;

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        let welcome = &frames[0];
        assert_eq!(welcome.kind, MessageType::UserJoined);
        assert_eq!(welcome.payload["id"], "c1");
        assert_eq!(welcome.payload["message"], WELCOME_MESSAGE);
        assert!(welcome.sender.is_none());
        assert!(welcome.timestamp.is_some());
    }

    #[tokio::test]
    async fn existing_clients_see_join_without_greeting() {
        let hub = BroadcastHub::new();
        let mut first = hub.connect("c1".to_string()).await;
        drain(&mut first);

        let _second = hub.connect("c2".to_string()).await;
        let frames = drain(&mut first);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, MessageType::UserJoined);
        assert_eq!(frames[0].payload["id"], "c2");
        // The greeting text is for the newcomer only.
        assert!(frames[0].payload.get("message").is_none());
    }

    #[tokio::test]
    async fn broadcast_excludes_sender() {
        let hub = BroadcastHub::new();
        let mut a = hub.connect("a".to_string()).await;
        let mut b = hub.connect("b".to_string()).await;
        let mut c = hub.connect("c".to_string()).await;
        drain(&mut a);
        drain(&mut b);
        drain(&mut c);

        hub.handle_inbound("a", r#"{"type":"feedback_submitted","payload":{"rating":5}}"#)
            .await;

        assert!(drain(&mut a).is_empty());
        for rx in [&mut b, &mut c] {
            let frames = drain(rx);
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0].kind, MessageType::FeedbackSubmitted);
            assert_eq!(frames[0].sender.as_deref(), Some("a"));
            assert!(frames[0].timestamp.is_some());
        }
    }

    #[tokio::test]
    async fn hub_overwrites_claimed_sender() {
        let hub = BroadcastHub::new();
        let _a = hub.connect("a".to_string()).await;
        let mut b = hub.connect("b".to_string()).await;
        drain(&mut b);

        hub.handle_inbound(
            "a",
            r#"{"type":"persona_updated","payload":{},"sender":"spoofed"}"#,
        )
        .await;

        let frames = drain(&mut b);
        assert_eq!(frames[0].sender.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn malformed_message_dropped_connection_stays() {
        let hub = BroadcastHub::new();
        let mut a = hub.connect("a".to_string()).await;
        let mut b = hub.connect("b".to_string()).await;
        drain(&mut a);
        drain(&mut b);

        hub.handle_inbound("a", "not json at all").await;
        hub.handle_inbound("a", r#"{"type":"bogus_kind","payload":{}}"#)
            .await;

        assert!(drain(&mut b).is_empty());
        assert_eq!(hub.connection_count().await, 2);

        // The connection still relays afterwards.
        hub.handle_inbound("a", r#"{"type":"annotation_updated","payload":{}}"#)
            .await;
        assert_eq!(drain(&mut b).len(), 1);
    }

    #[tokio::test]
    async fn disconnect_announces_to_remaining() {
        let hub = BroadcastHub::new();
        let _a = hub.connect("a".to_string()).await;
        let mut b = hub.connect("b".to_string()).await;
        drain(&mut b);

        hub.disconnect("a").await;
        let frames = drain(&mut b);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind, MessageType::UserLeft);
        assert_eq!(frames[0].payload["id"], "a");
        assert_eq!(hub.connection_count().await, 1);
    }

    #[tokio::test]
    async fn double_disconnect_announces_once() {
        let hub = BroadcastHub::new();
        let _a = hub.connect("a".to_string()).await;
        let mut b = hub.connect("b".to_string()).await;
        drain(&mut b);

        hub.disconnect("a").await;
        hub.disconnect("a").await;
        assert_eq!(drain(&mut b).len(), 1);
    }

    #[tokio::test]
    async fn publish_reaches_every_client() {
        let hub = BroadcastHub::new();
        let mut a = hub.connect("a".to_string()).await;
        let mut b = hub.connect("b".to_string()).await;
        drain(&mut a);
        drain(&mut b);

        hub.publish(Envelope::system(
            MessageType::AnnotationCreated,
            serde_json::json!({ "annotation": "hi" }),
        ))
        .await;

        for rx in [&mut a, &mut b] {
            let frames = drain(rx);
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0].kind, MessageType::AnnotationCreated);
            assert!(frames[0].sender.is_none());
            assert!(frames[0].timestamp.is_some());
        }
    }

    #[tokio::test]
    async fn shutdown_sends_close_frames() {
        let hub = BroadcastHub::new();
        let mut a = hub.connect("a".to_string()).await;
        drain(&mut a);

        hub.shutdown_all().await;
        assert!(matches!(a.try_recv(), Ok(Message::Close(None))));
        assert_eq!(hub.connection_count().await, 0);
    }
}
