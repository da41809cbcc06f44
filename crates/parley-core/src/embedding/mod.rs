//! Text embedding for semantic search.
//!
//! The `Embedder` port converts text into raw vectors; implementations
//! (e.g., fastembed) live in parley-infra. `EmbeddingProvider` wraps a
//! boxed embedder with preprocessing, truncation, normalization, and a
//! short-lived memoization cache.

pub mod box_embedder;
pub mod embedder;
pub mod provider;

pub use box_embedder::BoxEmbedder;
pub use embedder::{Embedder, UnavailableEmbedder};
pub use provider::{EmbeddingProvider, MAX_EMBED_CHARS};
