use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound WebSocket events from client to server
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsInboundEvent {
    /// Client opened a conversation view; join its room after a membership
    /// check.
    #[serde(rename = "join_conversation")]
    JoinConversation { conversation_id: Uuid },

    #[serde(rename = "leave_conversation")]
    LeaveConversation { conversation_id: Uuid },

    #[serde(rename = "typing_start")]
    TypingStart { conversation_id: Uuid },

    #[serde(rename = "typing_stop")]
    TypingStop { conversation_id: Uuid },

    /// Durably mark unread messages as read and notify the room.
    #[serde(rename = "mark_as_read")]
    MarkAsRead { conversation_id: Uuid },
}

/// Outbound events, shared verbatim by the WebSocket and SSE channels.
///
/// A client may receive the same message over more than one channel;
/// `new_message.id` is the deduplication key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeliveryEvent {
    /// First frame on an SSE stream, confirming authentication.
    #[serde(rename = "connected")]
    Connected { user_id: Uuid },

    #[serde(rename = "new_message")]
    NewMessage {
        id: Uuid,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: String,
        timestamp: String,
        is_read: bool,
    },

    /// Out-of-room hint that a conversation list entry changed.
    #[serde(rename = "conversation_updated")]
    ConversationUpdated {
        conversation_id: Uuid,
        last_message: String,
        timestamp: String,
    },

    #[serde(rename = "messages_read")]
    MessagesRead { conversation_id: Uuid, user_id: Uuid },

    #[serde(rename = "user_status_changed")]
    UserStatusChanged { user_id: Uuid, is_online: bool },

    #[serde(rename = "typing")]
    Typing {
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },
}

impl DeliveryEvent {
    /// Serialize for the wire. Delivery events are infallible to serialize;
    /// a failure here would be a programming error, so fall back to an
    /// empty object rather than poisoning a fan-out loop.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
