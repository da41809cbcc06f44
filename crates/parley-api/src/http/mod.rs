//! HTTP/WebSocket API layer for Parley.
//!
//! Axum-based REST API at `/api/v1/` with header-supplied identity,
//! envelope response format, and CORS support.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;
