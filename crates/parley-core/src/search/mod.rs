//! Semantic search over embedded message history.
//!
//! `SearchEngine` picks its retrieval path once, from the store's
//! `supports_vector_query` capability, and ranks both paths identically.

pub mod engine;

pub use engine::{SearchEngine, SearchMode, rank};
