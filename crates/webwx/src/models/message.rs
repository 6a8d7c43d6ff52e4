//! Message model representing an incoming chat message

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::wire::api::WireMessage;

/// Unique identifier for a message (server-assigned MsgId)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MsgId(pub String);

impl MsgId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MsgId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MsgId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A single incoming message delivered through the sync loop
///
/// Payload decoding (emoji, media, app messages) is out of scope here;
/// `content` carries the server's text as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-assigned message ID, used for de-duplication
    pub id: MsgId,
    /// Sender username (individual or chatroom identifier)
    pub from: String,
    /// Recipient username
    pub to: String,
    /// Numeric message type as reported by the server
    pub kind: i64,
    /// Raw message content
    pub content: String,
    /// When the server timestamped the message
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Convert a wire message into the domain model
    pub fn from_wire(wire: WireMessage) -> Self {
        let created_at = Utc
            .timestamp_opt(wire.create_time, 0)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            id: MsgId::new(wire.msg_id),
            from: wire.from_user_name,
            to: wire.to_user_name,
            kind: wire.msg_type,
            content: wire.content,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_wire() {
        let wire = WireMessage {
            msg_id: "9001".to_string(),
            from_user_name: "@abc".to_string(),
            to_user_name: "@def".to_string(),
            msg_type: 1,
            content: "hello".to_string(),
            create_time: 1_700_000_000,
        };

        let msg = ChatMessage::from_wire(wire);
        assert_eq!(msg.id.as_str(), "9001");
        assert_eq!(msg.from, "@abc");
        assert_eq!(msg.kind, 1);
        assert_eq!(msg.created_at.timestamp(), 1_700_000_000);
    }
}
