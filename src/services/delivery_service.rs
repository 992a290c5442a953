//! Delivery fan-out across the push channels
//!
//! Runs after a message is durably appended. Delivery is at-least-once and
//! best-effort: the same event goes to the conversation's WebSocket room and
//! to every recipient's SSE streams, recipients additionally get an
//! out-of-room conversation-list update, and clients deduplicate by message
//! id. A missed push is recovered through the polling endpoint; nothing
//! here returns an error to the sender.

use crate::models::conversation::Conversation;
use crate::models::message::Message;
use crate::sse::EventStreamRegistry;
use crate::websocket::message_types::DeliveryEvent;
use crate::websocket::ConnectionRegistry;
use uuid::Uuid;

pub struct DeliveryService;

impl DeliveryService {
    /// Push a freshly stored message to everyone currently connected.
    pub async fn dispatch_new_message(
        registry: &ConnectionRegistry,
        streams: &EventStreamRegistry,
        conversation: &Conversation,
        message: &Message,
    ) {
        let event = DeliveryEvent::NewMessage {
            id: message.id,
            conversation_id: conversation.id,
            sender_id: message.sender_id,
            content: message.content.clone(),
            timestamp: message.created_at.to_rfc3339(),
            is_read: message.is_read,
        }
        .to_json();

        // Channel A: everyone with the conversation open.
        registry.broadcast_room(conversation.id, &event).await;

        let update = DeliveryEvent::ConversationUpdated {
            conversation_id: conversation.id,
            last_message: message.content.clone(),
            timestamp: message.created_at.to_rfc3339(),
        }
        .to_json();

        for recipient in conversation.participants {
            if recipient == message.sender_id {
                continue;
            }

            // Channel A, out-of-room: conversation list refresh hint.
            registry.send_to_user(recipient, &update).await;

            // Channel B: every open stream of the recipient.
            streams.send_to_user(recipient, &event).await;
        }
    }

    /// Tell the room that `reader_id` has read the conversation.
    pub async fn dispatch_messages_read(
        registry: &ConnectionRegistry,
        conversation_id: Uuid,
        reader_id: Uuid,
    ) {
        let event = DeliveryEvent::MessagesRead {
            conversation_id,
            user_id: reader_id,
        }
        .to_json();

        registry.broadcast_room(conversation_id, &event).await;
    }

    /// Presence change, broadcast to every connected socket.
    pub async fn dispatch_presence(registry: &ConnectionRegistry, user_id: Uuid, is_online: bool) {
        let event = DeliveryEvent::UserStatusChanged { user_id, is_online }.to_json();
        registry.broadcast_all(&event).await;
    }
}
