//! Chat message types.
//!
//! A [`Message`] is created by the pipeline on send and persisted with a
//! null embedding. Its embedding is filled in exactly once, asynchronously,
//! after which the message becomes searchable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embedding::Embedding;
use crate::error::ChatError;

/// Monotonic store-assigned message identifier.
pub type MessageId = i64;

/// Identity supplied by the transport/session layer.
pub type UserId = i64;

/// Maximum message length in characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: String,
    /// Server-assigned, strictly increasing per store.
    pub created_at: DateTime<Utc>,
    /// Null until the embedding worker has processed the message.
    #[serde(skip)]
    pub embedding: Option<Embedding>,
}

impl Message {
    /// Whether this message can appear in semantic search results.
    pub fn is_searchable(&self) -> bool {
        self.embedding.is_some()
    }

    /// The participant that is not `user_id`.
    ///
    /// For a note-to-self both sides are the same user.
    pub fn counterpart_of(&self, user_id: UserId) -> UserId {
        if self.sender_id == user_id {
            self.receiver_id
        } else {
            self.sender_id
        }
    }
}

/// A message as received from a sender, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: String,
}

impl NewMessage {
    /// Build a new message, validating the text.
    ///
    /// Leading and trailing whitespace is kept as sent, but a message made
    /// only of whitespace is rejected.
    pub fn new(
        sender_id: UserId,
        receiver_id: UserId,
        text: impl Into<String>,
    ) -> Result<Self, ChatError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ChatError::InvalidMessage(
                "message text must not be empty".to_string(),
            ));
        }
        let chars = text.chars().count();
        if chars > MAX_MESSAGE_CHARS {
            return Err(ChatError::InvalidMessage(format!(
                "message text is {chars} characters, limit is {MAX_MESSAGE_CHARS}"
            )));
        }
        Ok(Self {
            sender_id,
            receiver_id,
            text,
        })
    }
}

/// Outcome of writing an embedding onto a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingUpdate {
    /// The embedding was written; the message is now searchable.
    Applied,
    /// The message already had an embedding; nothing changed.
    AlreadySet,
    /// No message with that id exists.
    NotFound,
}

/// Lifecycle of a message through the ingestion pipeline.
///
/// `Delivered` and `Embedded` are reached independently; a message whose
/// embedding fails stays `Delivered` forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    Received,
    Persisted,
    Delivered,
    Embedded,
    Searchable,
}

impl std::fmt::Display for MessageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageState::Received => write!(f, "received"),
            MessageState::Persisted => write!(f, "persisted"),
            MessageState::Delivered => write!(f, "delivered"),
            MessageState::Embedded => write!(f, "embedded"),
            MessageState::Searchable => write!(f, "searchable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(sender: UserId, receiver: UserId) -> Message {
        Message {
            id: 1,
            sender_id: sender,
            receiver_id: receiver,
            text: "hi".to_string(),
            created_at: Utc::now(),
            embedding: None,
        }
    }

    #[test]
    fn test_new_message_rejects_blank_text() {
        assert!(matches!(
            NewMessage::new(1, 2, "   \n"),
            Err(ChatError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_new_message_rejects_oversized_text() {
        let text = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(
            NewMessage::new(1, 2, text),
            Err(ChatError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_new_message_counts_chars_not_bytes() {
        // Multi-byte characters at exactly the limit are accepted.
        let text = "é".repeat(MAX_MESSAGE_CHARS);
        assert!(NewMessage::new(1, 2, text).is_ok());
    }

    #[test]
    fn test_counterpart() {
        let msg = sample(1, 2);
        assert_eq!(msg.counterpart_of(1), 2);
        assert_eq!(msg.counterpart_of(2), 1);
        assert_eq!(sample(3, 3).counterpart_of(3), 3);
    }

    #[test]
    fn test_embedding_not_serialized() {
        let mut msg = sample(1, 2);
        msg.embedding = Some(Embedding::new(vec![1.0, 0.0]));
        assert!(msg.is_searchable());
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("embedding").is_none());
        assert_eq!(json["text"], "hi");
    }

    #[test]
    fn test_message_state_display() {
        assert_eq!(MessageState::Searchable.to_string(), "searchable");
        let json = serde_json::to_string(&MessageState::Delivered).unwrap();
        assert_eq!(json, "\"delivered\"");
    }
}
