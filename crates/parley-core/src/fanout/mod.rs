//! Realtime delivery of newly persisted messages.

pub mod channel;

pub use channel::{FanoutChannel, Subscription};
