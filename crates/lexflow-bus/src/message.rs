use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single message exchanged between two agents on the bus.
///
/// Messages are immutable once sent; the bus only ever clones them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for this message.
    pub id: Uuid,
    /// Name of the sending agent.
    pub from: String,
    /// Name of the receiving agent.
    pub to: String,
    /// Message-type tag used for handler dispatch.
    pub kind: String,
    /// Opaque message body.
    pub payload: serde_json::Value,
    /// UTC timestamp of when the message was sent.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message addressed from one agent to another.
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        kind: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from: from.into(),
            to: to.into(),
            kind: kind.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::new("intake", "research", "case_ready", serde_json::json!({"id": 7}));
        assert_eq!(msg.from, "intake");
        assert_eq!(msg.to, "research");
        assert_eq!(msg.kind, "case_ready");
    }

    #[test]
    fn test_message_serialization() {
        let msg = Message::new("a", "b", "ping", serde_json::Value::Null);
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, msg.id);
        assert_eq!(parsed.kind, "ping");
    }
}
