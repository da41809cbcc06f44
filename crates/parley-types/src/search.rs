//! Search scopes and ranked results.

use serde::{Deserialize, Serialize};

use crate::message::{Message, UserId};

/// Upper bound on results per search request.
pub const MAX_SEARCH_LIMIT: usize = 100;

/// The set of messages a viewer is allowed to read or search.
///
/// Every scope is anchored on the viewer, so a user can only ever reach
/// messages they sent or received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversationScope {
    /// The unordered pair {user, other}.
    Conversation { user_id: UserId, other_user_id: UserId },
    /// Everything the user sent or received.
    AllOf { user_id: UserId },
}

impl ConversationScope {
    pub fn conversation(user_id: UserId, other_user_id: UserId) -> Self {
        ConversationScope::Conversation {
            user_id,
            other_user_id,
        }
    }

    pub fn all_of(user_id: UserId) -> Self {
        ConversationScope::AllOf { user_id }
    }

    /// The user this scope is read on behalf of.
    pub fn viewer(&self) -> UserId {
        match self {
            ConversationScope::Conversation { user_id, .. } => *user_id,
            ConversationScope::AllOf { user_id } => *user_id,
        }
    }

    /// Whether `message` falls inside this scope.
    pub fn includes(&self, message: &Message) -> bool {
        match *self {
            ConversationScope::Conversation {
                user_id,
                other_user_id,
            } => {
                (message.sender_id == user_id && message.receiver_id == other_user_id)
                    || (message.sender_id == other_user_id && message.receiver_id == user_id)
            }
            ConversationScope::AllOf { user_id } => {
                message.sender_id == user_id || message.receiver_id == user_id
            }
        }
    }
}

/// One ranked hit from a semantic search. Never persisted or cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub message: Message,
    /// Cosine similarity in [-1, 1].
    pub similarity: f32,
    /// 1-based position in the result list.
    pub rank: usize,
}
