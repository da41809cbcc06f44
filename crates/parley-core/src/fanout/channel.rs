//! Per-user broadcast fanout for live message delivery.
//!
//! Each connected user gets a `tokio::sync::broadcast` channel, created on
//! first subscribe and removed when their last subscription is dropped.
//! Publishing to a user with no live connections is a no-op; there is no
//! retroactive delivery.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parley_types::event::ChatEvent;
use parley_types::message::{Message, UserId};
use tokio::sync::broadcast;

struct Channels {
    senders: DashMap<UserId, broadcast::Sender<Arc<Message>>>,
    capacity: usize,
}

/// Live delivery of persisted messages to connected participants.
///
/// Cloning shares the same set of channels.
#[derive(Clone)]
pub struct FanoutChannel {
    inner: Arc<Channels>,
}

impl FanoutChannel {
    /// Create a fanout whose per-user buffers hold `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Channels {
                senders: DashMap::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Register a live connection for `user_id`.
    ///
    /// The subscription only sees messages published after this call.
    pub fn subscribe(&self, user_id: UserId) -> Subscription {
        let rx = self
            .inner
            .senders
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .subscribe();
        tracing::debug!(user_id, "fanout subscribe");
        Subscription {
            user_id,
            rx,
            channels: Arc::clone(&self.inner),
        }
    }

    /// Deliver `message` to every live connection of its receiver and sender.
    ///
    /// Returns the users that had at least one connection to deliver to.
    pub fn publish(&self, message: &Message) -> HashSet<UserId> {
        let shared = Arc::new(message.clone());
        let mut delivered = HashSet::new();
        for user_id in [message.receiver_id, message.sender_id] {
            if delivered.contains(&user_id) {
                continue;
            }
            let sent = self
                .inner
                .senders
                .get(&user_id)
                .is_some_and(|tx| tx.send(Arc::clone(&shared)).is_ok());
            if sent {
                delivered.insert(user_id);
            }
        }
        tracing::debug!(
            message_id = message.id,
            recipients = delivered.len(),
            "fanout publish"
        );
        delivered
    }

    /// Number of live connections for `user_id`.
    pub fn connection_count(&self, user_id: UserId) -> usize {
        self.inner
            .senders
            .get(&user_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Number of users with at least one live connection.
    pub fn online_users(&self) -> usize {
        self.inner.senders.len()
    }
}

impl std::fmt::Debug for FanoutChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutChannel")
            .field("online_users", &self.online_users())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

/// One live connection's view of the fanout.
pub struct Subscription {
    user_id: UserId,
    rx: broadcast::Receiver<Arc<Message>>,
    channels: Arc<Channels>,
}

impl Subscription {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Wait for the next message, rendered for this subscriber.
    ///
    /// Messages missed because the buffer overflowed are skipped. Returns
    /// `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<ChatEvent> {
        loop {
            match self.rx.recv().await {
                Ok(msg) => return Some(ChatEvent::for_subscriber(self.user_id, &msg)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(user_id = self.user_id, skipped, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Our own receiver is still alive here, hence `<= 1`.
        self.channels
            .senders
            .remove_if(&self.user_id, |_, tx| tx.receiver_count() <= 1);
    }
}
