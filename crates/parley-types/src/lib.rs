//! Shared domain types for Parley.
//!
//! This crate contains the core domain types used across the Parley chat
//! service: messages, embeddings, search scopes and results, realtime
//! events, configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod embedding;
pub mod error;
pub mod event;
pub mod message;
pub mod search;
