//! Realtime events pushed to connected clients.
//!
//! `ChatEvent` is the unified event type written to WebSocket subscribers.
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{Message, MessageId, UserId};

/// Wire representation of a delivered message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for MessagePayload {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id,
            sender_id: msg.sender_id,
            receiver_id: msg.receiver_id,
            message: msg.text.clone(),
            created_at: msg.created_at,
        }
    }
}

/// Events sent to a connected user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// The connection has joined the fanout for this user.
    Connected { user_id: UserId },

    /// A message addressed to this user.
    NewMessage(MessagePayload),

    /// Confirmation of a message this user sent (also echoed to their
    /// other open sessions).
    MessageSent(MessagePayload),

    /// A send over the socket was rejected.
    Error { code: String, message: String },

    /// Reply to a client ping.
    Pong,
}

impl ChatEvent {
    /// Render `message` for a subscriber.
    ///
    /// The sender sees `message_sent`; everyone else sees `new_message`.
    pub fn for_subscriber(subscriber: UserId, message: &Message) -> Self {
        let payload = MessagePayload::from(message);
        if message.sender_id == subscriber {
            ChatEvent::MessageSent(payload)
        } else {
            ChatEvent::NewMessage(payload)
        }
    }
}
