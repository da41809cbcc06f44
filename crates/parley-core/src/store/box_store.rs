//! BoxMessageStore -- object-safe dynamic dispatch wrapper for MessageStore.
//!
//! Follows the same blanket-impl pattern as BoxEmbedder:
//! 1. Define an object-safe `MessageStoreDyn` trait with boxed futures
//! 2. Blanket-impl `MessageStoreDyn` for all `T: MessageStore`
//! 3. `BoxMessageStore` wraps `Box<dyn MessageStoreDyn>` and delegates
//!
//! Unlike `BoxEmbedder`, the box itself implements `MessageStore`, so the
//! generic pipeline and search engine accept it directly.

use std::future::Future;
use std::pin::Pin;

use parley_types::embedding::Embedding;
use parley_types::error::RepositoryError;
use parley_types::message::{EmbeddingUpdate, Message, MessageId, NewMessage};
use parley_types::search::ConversationScope;

use super::message::MessageStore;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Object-safe version of [`MessageStore`] with boxed futures.
pub trait MessageStoreDyn: Send + Sync {
    fn append_boxed<'a>(&'a self, message: &'a NewMessage) -> BoxFuture<'a, Message>;

    fn set_embedding_boxed<'a>(
        &'a self,
        id: MessageId,
        embedding: &'a Embedding,
        model_name: &'a str,
    ) -> BoxFuture<'a, EmbeddingUpdate>;

    fn fetch_history_boxed<'a>(
        &'a self,
        scope: &'a ConversationScope,
        limit: usize,
    ) -> BoxFuture<'a, Vec<Message>>;

    fn unembedded_boxed<'a>(&'a self, limit: usize) -> BoxFuture<'a, Vec<Message>>;

    fn count_boxed<'a>(&'a self) -> BoxFuture<'a, u64>;

    fn supports_vector_query_dyn(&self) -> bool;

    fn nearest_neighbors_boxed<'a>(
        &'a self,
        scope: &'a ConversationScope,
        query: &'a Embedding,
        limit: usize,
    ) -> BoxFuture<'a, Vec<(Message, f32)>>;

    fn all_embedded_boxed<'a>(
        &'a self,
        scope: &'a ConversationScope,
    ) -> BoxFuture<'a, Vec<(Message, Embedding)>>;
}

impl<T: MessageStore> MessageStoreDyn for T {
    fn append_boxed<'a>(&'a self, message: &'a NewMessage) -> BoxFuture<'a, Message> {
        Box::pin(self.append(message))
    }

    fn set_embedding_boxed<'a>(
        &'a self,
        id: MessageId,
        embedding: &'a Embedding,
        model_name: &'a str,
    ) -> BoxFuture<'a, EmbeddingUpdate> {
        Box::pin(self.set_embedding(id, embedding, model_name))
    }

    fn fetch_history_boxed<'a>(
        &'a self,
        scope: &'a ConversationScope,
        limit: usize,
    ) -> BoxFuture<'a, Vec<Message>> {
        Box::pin(self.fetch_history(scope, limit))
    }

    fn unembedded_boxed<'a>(&'a self, limit: usize) -> BoxFuture<'a, Vec<Message>> {
        Box::pin(self.unembedded(limit))
    }

    fn count_boxed<'a>(&'a self) -> BoxFuture<'a, u64> {
        Box::pin(self.count())
    }

    fn supports_vector_query_dyn(&self) -> bool {
        self.supports_vector_query()
    }

    fn nearest_neighbors_boxed<'a>(
        &'a self,
        scope: &'a ConversationScope,
        query: &'a Embedding,
        limit: usize,
    ) -> BoxFuture<'a, Vec<(Message, f32)>> {
        Box::pin(self.nearest_neighbors(scope, query, limit))
    }

    fn all_embedded_boxed<'a>(
        &'a self,
        scope: &'a ConversationScope,
    ) -> BoxFuture<'a, Vec<(Message, Embedding)>> {
        Box::pin(self.all_embedded(scope))
    }
}

/// Type-erased message store for runtime backend selection.
pub struct BoxMessageStore {
    inner: Box<dyn MessageStoreDyn + Send + Sync>,
    backend: &'static str,
}

impl BoxMessageStore {
    /// Wrap a concrete store; `backend` is a label for logs and status output.
    pub fn new<T: MessageStore + 'static>(store: T, backend: &'static str) -> Self {
        Self {
            inner: Box::new(store),
            backend,
        }
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }
}

impl MessageStore for BoxMessageStore {
    async fn append(&self, message: &NewMessage) -> Result<Message, RepositoryError> {
        self.inner.append_boxed(message).await
    }

    async fn set_embedding(
        &self,
        id: MessageId,
        embedding: &Embedding,
        model_name: &str,
    ) -> Result<EmbeddingUpdate, RepositoryError> {
        self.inner.set_embedding_boxed(id, embedding, model_name).await
    }

    async fn fetch_history(
        &self,
        scope: &ConversationScope,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError> {
        self.inner.fetch_history_boxed(scope, limit).await
    }

    async fn unembedded(&self, limit: usize) -> Result<Vec<Message>, RepositoryError> {
        self.inner.unembedded_boxed(limit).await
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        self.inner.count_boxed().await
    }

    fn supports_vector_query(&self) -> bool {
        self.inner.supports_vector_query_dyn()
    }

    async fn nearest_neighbors(
        &self,
        scope: &ConversationScope,
        query: &Embedding,
        limit: usize,
    ) -> Result<Vec<(Message, f32)>, RepositoryError> {
        self.inner.nearest_neighbors_boxed(scope, query, limit).await
    }

    async fn all_embedded(
        &self,
        scope: &ConversationScope,
    ) -> Result<Vec<(Message, Embedding)>, RepositoryError> {
        self.inner.all_embedded_boxed(scope).await
    }
}
