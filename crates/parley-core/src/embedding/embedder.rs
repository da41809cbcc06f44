//! Embedder trait for text-to-vector conversion.
//!
//! Defines the interface for embedding text into vectors for semantic search.
//! Implementations (e.g., fastembed local models) live in parley-infra.

use parley_types::error::EmbeddingError;

/// Trait for converting text into embedding vectors.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// Implementations must be deterministic: the same text under the same
/// model always yields the same vector.
pub trait Embedder: Send + Sync {
    /// Embed one or more texts into vectors.
    ///
    /// Returns one vector per input text, in input order.
    fn embed(
        &self,
        texts: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<Vec<f32>>, EmbeddingError>> + Send;

    /// The model name used for embeddings (e.g., "all-minilm-l6-v2").
    fn model_name(&self) -> &str;

    /// The dimensionality of the output vectors.
    fn dimension(&self) -> usize;
}

/// Stand-in used when the embedding model could not be loaded.
///
/// Every call fails with `ProviderUnavailable`, which leaves new messages
/// deliverable but unsearchable and makes searches fail fast.
pub struct UnavailableEmbedder {
    reason: String,
    dimension: usize,
}

impl UnavailableEmbedder {
    pub fn new(reason: impl Into<String>, dimension: usize) -> Self {
        Self {
            reason: reason.into(),
            dimension,
        }
    }
}

impl Embedder for UnavailableEmbedder {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::ProviderUnavailable(self.reason.clone()))
    }

    fn model_name(&self) -> &str {
        "unavailable"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unavailable_embedder_always_fails() {
        let embedder = UnavailableEmbedder::new("model missing", 384);
        let err = embedder.embed(&["hello".to_string()]).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::ProviderUnavailable(ref r) if r == "model missing"));
        assert_eq!(embedder.dimension(), 384);
    }
}
