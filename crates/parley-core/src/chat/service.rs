//! Chat service: the operation surface the transport layer talks to.
//!
//! ChatService wires the ingestion pipeline, the search engine, and the
//! fanout around one shared message store and embedding provider.

use std::sync::Arc;

use parley_types::config::ChatConfig;
use parley_types::error::ChatError;
use parley_types::message::{Message, UserId};
use parley_types::search::{ConversationScope, SearchResult};
use tracing::info;

use crate::embedding::EmbeddingProvider;
use crate::fanout::FanoutChannel;
use crate::pipeline::{PipelineCoordinator, PipelineHandle};
use crate::search::{SearchEngine, SearchMode};
use crate::store::MessageStore;

/// Upper bound on messages returned by one history read.
pub const MAX_HISTORY_LIMIT: usize = 500;

/// Send, read, and search chat messages.
///
/// Generic over `MessageStore` to maintain clean architecture
/// (parley-core never depends on parley-infra).
pub struct ChatService<S: MessageStore> {
    store: Arc<S>,
    provider: Arc<EmbeddingProvider>,
    pipeline: PipelineCoordinator<S>,
    search: SearchEngine<S>,
    default_history_limit: usize,
}

impl<S: MessageStore + 'static> ChatService<S> {
    /// Build the service and start its embedding worker.
    pub fn start(
        store: Arc<S>,
        provider: Arc<EmbeddingProvider>,
        config: &ChatConfig,
    ) -> (Self, PipelineHandle) {
        let fanout = FanoutChannel::new(config.fanout_capacity);
        let (pipeline, handle) =
            PipelineCoordinator::start(Arc::clone(&store), Arc::clone(&provider), fanout, config);
        let search = SearchEngine::new(Arc::clone(&store), Arc::clone(&provider))
            .with_min_similarity(config.min_similarity);

        info!(
            search_mode = %search.mode(),
            model = provider.model_name(),
            "chat service started"
        );

        (
            Self {
                store,
                provider,
                pipeline,
                search,
                default_history_limit: config.default_history_limit,
            },
            handle,
        )
    }

    /// Persist and deliver a message from `sender_id` to `receiver_id`.
    pub async fn send_message(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        text: &str,
    ) -> Result<Message, ChatError> {
        self.pipeline.send(sender_id, receiver_id, text).await
    }

    /// The conversation between `user_id` and `other_user_id`, newest first.
    ///
    /// `limit` is capped at [`MAX_HISTORY_LIMIT`]; zero is rejected.
    pub async fn get_history(
        &self,
        user_id: UserId,
        other_user_id: UserId,
        limit: usize,
    ) -> Result<Vec<Message>, ChatError> {
        if limit == 0 {
            return Err(ChatError::InvalidQuery("limit must be at least 1".to_string()));
        }
        let scope = ConversationScope::conversation(user_id, other_user_id);
        let messages = self
            .store
            .fetch_history(&scope, limit.min(MAX_HISTORY_LIMIT))
            .await?;
        Ok(messages)
    }

    /// Search `user_id`'s messages, optionally narrowed to one conversation.
    pub async fn semantic_search(
        &self,
        user_id: UserId,
        query: &str,
        limit: usize,
        other_user_id: Option<UserId>,
    ) -> Result<Vec<SearchResult>, ChatError> {
        let scope = match other_user_id {
            Some(other) => ConversationScope::conversation(user_id, other),
            None => ConversationScope::all_of(user_id),
        };
        self.search.search(&scope, query, limit).await
    }

    /// Queue up to `limit` unembedded messages for the worker.
    pub async fn backfill(&self, limit: usize) -> Result<usize, ChatError> {
        self.pipeline.backfill(limit).await
    }

    pub fn fanout(&self) -> &FanoutChannel {
        self.pipeline.fanout()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn search_mode(&self) -> SearchMode {
        self.search.mode()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn default_history_limit(&self) -> usize {
        self.default_history_limit
    }
}
