use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Trait for getting the wire event type name
pub trait EventType {
    fn event_type(&self) -> &'static str;
}

/// Server-to-client events.
///
/// On the wire every event is a JSON object of the shape
/// `{"type": "...", "payload": {...}}`. Clients switch on `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    /// A new message was persisted in a conversation the recipient
    /// participates in. The payload is the complete message entity.
    #[serde(rename = "NEW_MESSAGE")]
    NewMessage(Value),

    /// A user explicitly joined a conversation room.
    #[serde(rename = "USER_JOINED")]
    #[serde(rename_all = "camelCase")]
    UserJoined {
        conversation_id: String,
        user_id: Option<String>,
        timestamp: String,
    },

    /// A user left a conversation room.
    #[serde(rename = "USER_LEFT")]
    #[serde(rename_all = "camelCase")]
    UserLeft {
        conversation_id: String,
        user_id: Option<String>,
    },

    /// Liveness probe response, sent only to the probing connection.
    #[serde(rename = "PONG")]
    Pong { timestamp: String },
}

impl EventType for Event {
    fn event_type(&self) -> &'static str {
        match self {
            Event::NewMessage(_) => "NEW_MESSAGE",
            Event::UserJoined { .. } => "USER_JOINED",
            Event::UserLeft { .. } => "USER_LEFT",
            Event::Pong { .. } => "PONG",
        }
    }
}

/// Client-to-server frames.
///
/// Same `{"type", "payload"}` envelope as server events. Frames that fail
/// to parse are logged and ignored; the connection stays open.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    #[serde(rename = "JOIN_CONVERSATION")]
    #[serde(rename_all = "camelCase")]
    JoinConversation { conversation_id: String },

    #[serde(rename = "LEAVE_CONVERSATION")]
    #[serde(rename_all = "camelCase")]
    LeaveConversation { conversation_id: String },

    #[serde(rename = "PING")]
    Ping,
}
