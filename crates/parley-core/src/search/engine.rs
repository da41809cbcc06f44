//! Semantic search over a user's message history.

use std::cmp::Ordering;
use std::sync::Arc;

use parley_types::embedding::Embedding;
use parley_types::error::ChatError;
use parley_types::message::Message;
use parley_types::search::{ConversationScope, MAX_SEARCH_LIMIT, SearchResult};

use crate::embedding::EmbeddingProvider;
use crate::store::MessageStore;

/// How candidates are retrieved, fixed when the engine is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// The store answers nearest-neighbor queries itself.
    VectorIndex,
    /// Every embedded message in scope is scored in-process.
    Fallback,
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchMode::VectorIndex => write!(f, "vector_index"),
            SearchMode::Fallback => write!(f, "fallback"),
        }
    }
}

pub struct SearchEngine<S: MessageStore> {
    store: Arc<S>,
    provider: Arc<EmbeddingProvider>,
    mode: SearchMode,
    min_similarity: Option<f32>,
}

impl<S: MessageStore> SearchEngine<S> {
    pub fn new(store: Arc<S>, provider: Arc<EmbeddingProvider>) -> Self {
        let mode = if store.supports_vector_query() {
            SearchMode::VectorIndex
        } else {
            SearchMode::Fallback
        };
        Self {
            store,
            provider,
            mode,
            min_similarity: None,
        }
    }

    /// Drop hits scoring below `threshold`, on either path.
    pub fn with_min_similarity(mut self, threshold: Option<f32>) -> Self {
        self.min_similarity = threshold;
        self
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    /// Rank embedded messages in `scope` by similarity to `query`.
    ///
    /// `limit` is capped at [`MAX_SEARCH_LIMIT`]. Messages that have not
    /// been embedded yet never appear.
    pub async fn search(
        &self,
        scope: &ConversationScope,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, ChatError> {
        if query.trim().is_empty() {
            return Err(ChatError::InvalidQuery("query must not be empty".to_string()));
        }
        if limit == 0 {
            return Err(ChatError::InvalidQuery("limit must be at least 1".to_string()));
        }
        let limit = limit.min(MAX_SEARCH_LIMIT);

        let query_vec = self.provider.embed(query).await?;

        let scored = match self.mode {
            SearchMode::VectorIndex => self.indexed_candidates(scope, &query_vec, limit).await?,
            SearchMode::Fallback => self.scan_candidates(scope, &query_vec).await?,
        };

        let results = rank(scored, scope, self.min_similarity, limit);
        tracing::debug!(
            mode = %self.mode,
            viewer = scope.viewer(),
            hits = results.len(),
            "semantic search"
        );
        Ok(results)
    }

    async fn indexed_candidates(
        &self,
        scope: &ConversationScope,
        query: &Embedding,
        limit: usize,
    ) -> Result<Vec<(Message, f32)>, ChatError> {
        let neighbors = self.store.nearest_neighbors(scope, query, limit).await?;
        Ok(neighbors
            .into_iter()
            .map(|(msg, distance)| (msg, (1.0 - distance).clamp(-1.0, 1.0)))
            .collect())
    }

    async fn scan_candidates(
        &self,
        scope: &ConversationScope,
        query: &Embedding,
    ) -> Result<Vec<(Message, f32)>, ChatError> {
        let candidates = self.store.all_embedded(scope).await?;
        Ok(candidates
            .into_iter()
            .map(|(mut msg, embedding)| {
                let similarity = query.cosine_similarity(&embedding);
                msg.embedding = Some(embedding);
                (msg, similarity)
            })
            .collect())
    }
}

/// Order hits by similarity, then recency, then id, and assign ranks.
///
/// Hits outside `scope` or without an embedding are discarded whatever the
/// store returned.
pub fn rank(
    mut scored: Vec<(Message, f32)>,
    scope: &ConversationScope,
    min_similarity: Option<f32>,
    limit: usize,
) -> Vec<SearchResult> {
    scored.retain(|(msg, similarity)| {
        msg.is_searchable()
            && scope.includes(msg)
            && min_similarity.is_none_or(|min| *similarity >= min)
    });

    scored.sort_by(|(a, sa), (b, sb)| {
        sb.partial_cmp(sa)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| b.id.cmp(&a.id))
    });

    scored
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, (message, similarity))| SearchResult {
            message,
            similarity,
            rank: i + 1,
        })
        .collect()
}
