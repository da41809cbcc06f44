//! Ingestion pipeline: receive, persist, then deliver and embed in parallel.
//!
//! `PipelineCoordinator` handles the synchronous part of a send. The
//! `EmbeddingWorker` task fills in embeddings off the delivery path.

pub mod coordinator;
pub mod worker;

pub use coordinator::{PipelineCoordinator, PipelineHandle};
pub use worker::{DEFAULT_RETRY_BACKOFF, EmbedJob, EmbeddingWorker};
