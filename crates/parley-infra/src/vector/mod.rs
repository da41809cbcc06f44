//! LanceDB-backed vector storage for message embeddings.

pub mod lance;
pub mod schema;
pub mod store;

pub use lance::LanceVectorStore;
pub use schema::{MESSAGE_VECTORS_TABLE, message_vectors_schema};
pub use store::{ANN_INDEX_MIN_ROWS, LanceMessageStore};
