//! Message persistence ports.
//!
//! `MessageStore` is implemented by a plain SQLite backend and by a
//! vector-indexed backend in parley-infra. Callers pick their search
//! algorithm from `supports_vector_query`, never from the concrete type.

pub mod box_store;
pub mod message;

pub use box_store::BoxMessageStore;
pub use message::MessageStore;
