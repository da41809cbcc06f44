//! SQLite persistence: connection pools and the plain message store.

pub mod message;
pub mod pool;

pub use message::SqliteMessageStore;
pub use pool::DatabasePool;
