//! Custom axum extractors.

pub mod identity;
