//! Local embedding models.

pub mod fastembed;

pub use self::fastembed::{FastEmbedder, parse_model};
