//! Chat operations exposed to the transport layer.

pub mod service;

pub use service::{ChatService, MAX_HISTORY_LIMIT};
