use thiserror::Error;

/// Errors surfaced by the chat core to its callers.
///
/// Sends either fully succeed or fail with one of these; searches return a
/// ranked list or one of these. There is no partial result.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The store could not durably record the message (or answer a query).
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The embedding model is not usable.
    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Empty query text or a non-positive limit.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Message text failed validation (empty or too long).
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("message not found")]
    NotFound,
}

impl From<RepositoryError> for ChatError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => ChatError::NotFound,
            other => ChatError::Persistence(other.to_string()),
        }
    }
}

impl From<EmbeddingError> for ChatError {
    fn from(e: EmbeddingError) -> Self {
        ChatError::ProviderUnavailable(e.to_string())
    }
}

/// Errors from embedding generation.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Errors from repository operations (used by trait definitions in parley-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    /// The backend does not implement the requested capability.
    #[error("unsupported by this store: {0}")]
    Unsupported(&'static str),
}
