//! Realtime message envelope shared by the broadcast hub and the queue relay.
//!
//! This module lives in `core` (zero internal deps) so that the WebSocket
//! layer, the job queue relay, and any future tooling all agree on the wire
//! protocol.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Message types
// ---------------------------------------------------------------------------

/// Kinds of realtime messages relayed between collaborators.
///
/// Serialized as the snake_case `"type"` discriminator string so the
/// frontend can route messages by type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    AnnotationCreated,
    AnnotationUpdated,
    FeedbackSubmitted,
    PersonaUpdated,
    UserJoined,
    UserLeft,
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The wire envelope for realtime messages.
///
/// `sender` is absent for system-generated messages. `timestamp` (epoch
/// milliseconds) is stamped by the hub at send time, overriding anything a
/// client supplied, so all clients share one ordering reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Message kind discriminator.
    #[serde(rename = "type")]
    pub kind: MessageType,

    /// Type-specific message body.
    pub payload: serde_json::Value,

    /// Client id of the originator; `None` for system messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    /// Epoch milliseconds, stamped by the hub at send time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Envelope {
    /// Create a system-originated envelope (no sender, unstamped).
    pub fn system(kind: MessageType, payload: serde_json::Value) -> Self {
        Self {
            kind,
            payload,
            sender: None,
            timestamp: None,
        }
    }

    /// Parse a raw inbound frame into an envelope.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Current wall-clock time as epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_snake_case_type() {
        let env = Envelope::system(
            MessageType::AnnotationCreated,
            serde_json::json!({ "id": "a1" }),
        );
        let json = serde_json::to_string(&env).unwrap();
        assert!(json.contains(r#""type":"annotation_created""#));
        // System messages omit sender and timestamp entirely.
        assert!(!json.contains("sender"));
        assert!(!json.contains("timestamp"));
    }

    #[test]
    fn parses_client_message() {
        let raw = r#"{"type":"feedback_submitted","payload":{"rating":5}}"#;
        let env = Envelope::parse(raw).unwrap();
        assert_eq!(env.kind, MessageType::FeedbackSubmitted);
        assert_eq!(env.payload["rating"], 5);
        assert!(env.sender.is_none());
        assert!(env.timestamp.is_none());
    }

    #[test]
    fn parses_all_known_types() {
        for (s, kind) in [
            ("annotation_created", MessageType::AnnotationCreated),
            ("annotation_updated", MessageType::AnnotationUpdated),
            ("feedback_submitted", MessageType::FeedbackSubmitted),
            ("persona_updated", MessageType::PersonaUpdated),
            ("user_joined", MessageType::UserJoined),
            ("user_left", MessageType::UserLeft),
        ] {
            let raw = format!(r#"{{"type":"{s}","payload":{{}}}}"#);
            assert_eq!(Envelope::parse(&raw).unwrap().kind, kind);
        }
    }

    #[test]
    fn unknown_type_rejected() {
        let raw = r#"{"type":"shrug","payload":{}}"#;
        assert!(Envelope::parse(raw).is_err());
    }

    #[test]
    fn missing_payload_rejected() {
        let raw = r#"{"type":"user_joined"}"#;
        assert!(Envelope::parse(raw).is_err());
    }

    #[test]
    fn not_json_rejected() {
        assert!(Envelope::parse("definitely not json").is_err());
    }

    #[test]
    fn round_trips_with_sender_and_timestamp() {
        let env = Envelope {
            kind: MessageType::UserLeft,
            payload: serde_json::json!({ "id": "c1" }),
            sender: Some("c1".to_string()),
            timestamp: Some(1_700_000_000_000),
        };
        let back = Envelope::parse(&serde_json::to_string(&env).unwrap()).unwrap();
        assert_eq!(env, back);
    }

    #[test]
    fn now_millis_is_plausible() {
        // 2020-01-01 in epoch millis.
        assert!(now_millis() > 1_577_836_800_000);
    }
}
