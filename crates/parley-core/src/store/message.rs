//! Message store trait definition.
//!
//! Defines the storage interface for chat messages and their embeddings.
//! The infrastructure layer (parley-infra) implements this trait with a
//! plain SQLite backend and a SQLite + LanceDB vector-indexed backend.

use parley_types::embedding::Embedding;
use parley_types::error::RepositoryError;
use parley_types::message::{EmbeddingUpdate, Message, MessageId, NewMessage};
use parley_types::search::ConversationScope;

/// Repository trait for chat message persistence.
///
/// Covers three concerns:
/// - **Writes:** append a message, attach its embedding exactly once.
/// - **History:** newest-first reads bounded by a conversation scope.
/// - **Search candidates:** nearest-neighbor queries (vector-capable
///   backends) or a full scan of embedded messages (every backend).
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait MessageStore: Send + Sync {
    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Persist a new message with a null embedding.
    ///
    /// The store assigns the id and a timestamp strictly greater than any
    /// timestamp it has assigned before.
    fn append(
        &self,
        message: &NewMessage,
    ) -> impl std::future::Future<Output = Result<Message, RepositoryError>> + Send;

    /// Attach an embedding to a stored message.
    ///
    /// Unknown ids report `NotFound` and messages that already carry an
    /// embedding report `AlreadySet`; neither is an error.
    fn set_embedding(
        &self,
        id: MessageId,
        embedding: &Embedding,
        model_name: &str,
    ) -> impl std::future::Future<Output = Result<EmbeddingUpdate, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// Messages in scope, newest first, at most `limit`.
    fn fetch_history(
        &self,
        scope: &ConversationScope,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, RepositoryError>> + Send;

    /// Messages still waiting for an embedding, oldest first.
    fn unembedded(
        &self,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, RepositoryError>> + Send;

    /// Total number of stored messages.
    fn count(&self) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Search candidates
    // -----------------------------------------------------------------------

    /// Whether `nearest_neighbors` is backed by a vector index.
    ///
    /// Fixed for the lifetime of the store.
    fn supports_vector_query(&self) -> bool;

    /// Closest embedded messages in scope by cosine distance, ascending.
    ///
    /// Approximate: exact recall is not guaranteed. Backends without a
    /// vector index return `RepositoryError::Unsupported`.
    fn nearest_neighbors(
        &self,
        scope: &ConversationScope,
        query: &Embedding,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<(Message, f32)>, RepositoryError>> + Send;

    /// Every embedded message in scope with its vector, in no particular order.
    fn all_embedded(
        &self,
        scope: &ConversationScope,
    ) -> impl std::future::Future<Output = Result<Vec<(Message, Embedding)>, RepositoryError>> + Send;
}
