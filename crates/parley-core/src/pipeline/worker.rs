//! Background embedding worker.
//!
//! Consumes `EmbedJob`s from the bounded pipeline queue, embeds the text
//! with bounded retry, and writes the vector back to the store. Runs as a
//! single tokio task; the model itself runs wherever the embedder puts it.
//!
//! When the coordinator drops a live job because the queue was full it
//! raises the shared rescan flag. The next time the queue runs empty the
//! worker embeds whatever the store still reports as unembedded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parley_types::error::{ChatError, EmbeddingError};
use parley_types::message::{EmbeddingUpdate, Message, MessageId, MessageState};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::embedding::EmbeddingProvider;
use crate::store::MessageStore;

/// First retry delay; doubles on each further attempt.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Unembedded messages picked up per recovery pass.
const RESCAN_BATCH: usize = 256;

/// A persisted message waiting for its embedding.
#[derive(Debug, Clone)]
pub struct EmbedJob {
    pub message_id: MessageId,
    pub text: String,
}

impl From<&Message> for EmbedJob {
    fn from(msg: &Message) -> Self {
        Self {
            message_id: msg.id,
            text: msg.text.clone(),
        }
    }
}

pub struct EmbeddingWorker<S: MessageStore> {
    store: Arc<S>,
    provider: Arc<EmbeddingProvider>,
    retries: u32,
    backoff: Duration,
    rescan: Arc<AtomicBool>,
}

impl<S: MessageStore> EmbeddingWorker<S> {
    pub fn new(store: Arc<S>, provider: Arc<EmbeddingProvider>, retries: u32) -> Self {
        Self {
            store,
            provider,
            retries,
            backoff: DEFAULT_RETRY_BACKOFF,
            rescan: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that requests a store rescan once the queue is idle.
    pub fn rescan_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.rescan)
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Process jobs until cancelled or the queue closes.
    ///
    /// On cancellation the queue is closed to new jobs and whatever was
    /// already queued is still processed before returning.
    pub async fn run(self, mut jobs: mpsc::Receiver<EmbedJob>, cancel: CancellationToken) {
        tracing::info!(model = self.provider.model_name(), "embedding worker started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                job = jobs.recv() => match job {
                    Some(job) => {
                        self.handle(job).await;
                        if jobs.is_empty() {
                            self.recover_dropped(&cancel).await;
                        }
                    }
                    None => {
                        tracing::info!("embedding queue closed, worker exiting");
                        return;
                    }
                },
            }
        }

        jobs.close();
        let mut drained = 0usize;
        while let Some(job) = jobs.recv().await {
            self.handle(job).await;
            drained += 1;
        }
        tracing::info!(drained, "embedding worker stopped");
    }

    /// Embed messages whose jobs were dropped, if any were.
    ///
    /// Works through the store in batches until a batch comes back short or
    /// makes no progress; messages that keep failing stay for backfill.
    async fn recover_dropped(&self, cancel: &CancellationToken) {
        if !self.rescan.swap(false, Ordering::AcqRel) {
            return;
        }
        let mut recovered = 0usize;
        loop {
            let pending = match self.store.unembedded(RESCAN_BATCH).await {
                Ok(pending) => pending,
                Err(e) => {
                    tracing::warn!(error = %e, "could not list unembedded messages");
                    break;
                }
            };

            let mut applied = 0usize;
            for message in &pending {
                if cancel.is_cancelled() {
                    self.rescan.store(true, Ordering::Release);
                    return;
                }
                if let Ok(EmbeddingUpdate::Applied) = self.process(EmbedJob::from(message)).await {
                    applied += 1;
                }
            }
            recovered += applied;
            if pending.len() < RESCAN_BATCH || applied == 0 {
                break;
            }
        }
        if recovered > 0 {
            tracing::info!(recovered, "embedded messages whose jobs were dropped");
        }
    }

    async fn handle(&self, job: EmbedJob) {
        let id = job.message_id;
        match self.process(job).await {
            Ok(EmbeddingUpdate::Applied) => {
                tracing::debug!(message_id = id, state = %MessageState::Searchable, "message embedded");
            }
            Ok(EmbeddingUpdate::AlreadySet) => {
                tracing::debug!(message_id = id, "embedding already present, skipped");
            }
            Ok(EmbeddingUpdate::NotFound) => {
                tracing::warn!(message_id = id, "message vanished before embedding was stored");
            }
            Err(e) => {
                tracing::warn!(message_id = id, error = %e, "message left unsearchable");
            }
        }
    }

    /// Embed one message and store the vector.
    pub async fn process(&self, job: EmbedJob) -> Result<EmbeddingUpdate, ChatError> {
        let embedding = self.embed_with_retry(&job).await?;
        tracing::trace!(message_id = job.message_id, state = %MessageState::Embedded, "vector computed");
        let update = self
            .store
            .set_embedding(job.message_id, &embedding, self.provider.model_name())
            .await?;
        Ok(update)
    }

    async fn embed_with_retry(
        &self,
        job: &EmbedJob,
    ) -> Result<parley_types::embedding::Embedding, EmbeddingError> {
        let mut attempt = 0u32;
        loop {
            match self.provider.embed(&job.text).await {
                Ok(embedding) => return Ok(embedding),
                // Retrying cannot fix a model/config disagreement.
                Err(e @ EmbeddingError::DimensionMismatch { .. }) => return Err(e),
                Err(e) if attempt >= self.retries => return Err(e),
                Err(e) => {
                    let delay = self.backoff * 2u32.saturating_pow(attempt);
                    tracing::debug!(
                        message_id = job.message_id,
                        attempt = attempt + 1,
                        error = %e,
                        ?delay,
                        "embedding failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
