//! Business logic and port definitions for Parley.
//!
//! This crate defines the "ports" (store and embedder traits) that the
//! infrastructure layer implements, plus the message pipeline built on
//! them. It depends only on `parley-types` -- never on `parley-infra` or
//! any database/IO crate.

pub mod chat;
pub mod embedding;
pub mod fanout;
pub mod pipeline;
pub mod search;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
