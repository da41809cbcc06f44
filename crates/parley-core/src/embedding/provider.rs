//! Embedding provider: preprocessing, truncation, normalization, memoization.

use std::time::Duration;

use moka::future::Cache;
use parley_types::config::ChatConfig;
use parley_types::embedding::Embedding;
use parley_types::error::EmbeddingError;

use super::box_embedder::BoxEmbedder;

/// Texts longer than this many characters are truncated before embedding.
pub const MAX_EMBED_CHARS: usize = 2048;

/// Turns text into unit-length embeddings.
///
/// Shared by the embedding worker and the search engine. Identical text
/// (after preprocessing) within the cache TTL is embedded once; concurrent
/// requests for the same text wait on a single model call.
pub struct EmbeddingProvider {
    embedder: BoxEmbedder,
    cache: Cache<String, Embedding>,
}

impl EmbeddingProvider {
    pub fn new(embedder: BoxEmbedder, cache_ttl: Duration, cache_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(cache_capacity)
            .time_to_live(cache_ttl)
            .build();
        Self { embedder, cache }
    }

    pub fn from_config(embedder: BoxEmbedder, config: &ChatConfig) -> Self {
        Self::new(
            embedder,
            Duration::from_secs(config.embed_cache_ttl_secs),
            config.embed_cache_capacity,
        )
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Embed a single text.
    ///
    /// Whitespace-only text yields a zero vector without calling the model.
    pub async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let key = preprocess(text);
        if key.is_empty() {
            return Ok(Embedding::new(vec![0.0; self.dimension()]));
        }

        self.cache
            .try_get_with(key.clone(), self.compute(key))
            .await
            .map_err(|e| (*e).clone())
    }

    async fn compute(&self, key: String) -> Result<Embedding, EmbeddingError> {
        let mut vectors = self.embedder.embed(std::slice::from_ref(&key)).await?;
        if vectors.len() != 1 {
            return Err(EmbeddingError::ProviderUnavailable(format!(
                "embedder returned {} vectors for one input",
                vectors.len()
            )));
        }
        let raw = vectors.remove(0);

        let expected = self.dimension();
        if raw.len() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: raw.len(),
            });
        }

        tracing::trace!(chars = key.chars().count(), "computed embedding");
        Ok(Embedding::new(raw).l2_normalized())
    }
}

/// Normalize text the same way for messages and queries.
fn preprocess(text: &str) -> String {
    truncate_chars(text.trim(), MAX_EMBED_CHARS).to_lowercase()
}

/// Cut `text` to at most `max` characters on a char boundary.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::UnavailableEmbedder;
    use crate::testing::KeywordEmbedder;

    fn provider_with(embedder: KeywordEmbedder) -> EmbeddingProvider {
        EmbeddingProvider::new(BoxEmbedder::new(embedder), Duration::from_secs(60), 100)
    }

    #[tokio::test]
    async fn embed_is_normalized_and_deterministic() {
        let provider = provider_with(KeywordEmbedder::new());

        let a = provider.embed("Let's meet at 3pm").await.unwrap();
        let b = provider.embed("  let's MEET at 3pm ").await.unwrap();

        assert_eq!(a, b);
        assert!((a.norm() - 1.0).abs() < 1e-5);
        assert_eq!(a.dimension(), provider.dimension());
    }

    #[tokio::test]
    async fn identical_text_is_memoized() {
        let embedder = KeywordEmbedder::new();
        let calls = embedder.call_counter();
        let provider = provider_with(embedder);

        provider.embed("homework is due tomorrow").await.unwrap();
        provider.embed("homework is due tomorrow").await.unwrap();
        provider.embed("HOMEWORK is due tomorrow").await.unwrap();

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blank_text_yields_zero_vector_without_model_call() {
        let embedder = KeywordEmbedder::new();
        let calls = embedder.call_counter();
        let provider = provider_with(embedder);

        let v = provider.embed("   ").await.unwrap();
        assert_eq!(v.norm(), 0.0);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn long_text_is_truncated_not_rejected() {
        let provider = provider_with(KeywordEmbedder::new());
        let long = "meeting ".repeat(2000);
        assert!(provider.embed(&long).await.is_ok());
    }

    #[tokio::test]
    async fn unavailable_model_fails_with_provider_unavailable() {
        let provider = EmbeddingProvider::new(
            BoxEmbedder::new(UnavailableEmbedder::new("not loaded", 16)),
            Duration::from_secs(60),
            100,
        );
        let err = provider.embed("hello").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let embedder = KeywordEmbedder::new();
        let calls = embedder.call_counter();
        let provider = provider_with(embedder);

        assert!(provider.embed("please [embed-fail]").await.is_err());
        assert!(provider.embed("please [embed-fail]").await.is_err());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }
}
