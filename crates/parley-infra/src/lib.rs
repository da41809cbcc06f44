//! Infrastructure layer for Parley.
//!
//! Contains implementations of the ports defined in `parley-core`: SQLite
//! message storage, the LanceDB vector-indexed store, the fastembed model
//! adapter, and config/data-dir loading.

pub mod config;
pub mod embedding;
pub mod sqlite;
pub mod vector;
