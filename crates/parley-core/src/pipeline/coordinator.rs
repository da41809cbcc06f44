//! Message ingestion: validate, persist, publish, enqueue for embedding.
//!
//! Delivery and embedding are independent consumers of a persisted message:
//! the fanout broadcast happens inline, the embedding job goes onto a bounded
//! queue drained by [`EmbeddingWorker`]. A send never waits on the model.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parley_types::config::ChatConfig;
use parley_types::error::ChatError;
use parley_types::message::{Message, MessageState, NewMessage, UserId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::worker::{EmbedJob, EmbeddingWorker};
use crate::embedding::EmbeddingProvider;
use crate::fanout::FanoutChannel;
use crate::store::MessageStore;

/// How often backfill rechecks the queue while it is above its share.
const BACKFILL_POLL: Duration = Duration::from_millis(20);

/// Owns the embedding worker task.
///
/// Dropping the handle does not stop the worker; call [`shutdown`](Self::shutdown).
pub struct PipelineHandle {
    cancel: CancellationToken,
    worker: JoinHandle<()>,
}

impl PipelineHandle {
    /// Stop accepting jobs, finish the queued ones, and wait for the worker.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.worker.await {
            tracing::error!(error = %e, "embedding worker panicked");
        }
    }
}

pub struct PipelineCoordinator<S: MessageStore> {
    store: Arc<S>,
    fanout: FanoutChannel,
    jobs: mpsc::Sender<EmbedJob>,
    /// Raised when a live job is dropped; the worker rescans the store.
    rescan: Arc<AtomicBool>,
}

impl<S: MessageStore + 'static> PipelineCoordinator<S> {
    /// Build the coordinator and spawn its embedding worker.
    pub fn start(
        store: Arc<S>,
        provider: Arc<EmbeddingProvider>,
        fanout: FanoutChannel,
        config: &ChatConfig,
    ) -> (Self, PipelineHandle) {
        let worker = EmbeddingWorker::new(Arc::clone(&store), provider, config.embed_retries);
        Self::start_with_worker(store, fanout, worker, config.embed_queue_capacity)
    }

    pub(crate) fn start_with_worker(
        store: Arc<S>,
        fanout: FanoutChannel,
        worker: EmbeddingWorker<S>,
        queue_capacity: usize,
    ) -> (Self, PipelineHandle) {
        let (jobs, rx) = mpsc::channel(queue_capacity.max(1));
        let rescan = worker.rescan_flag();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(rx, cancel.clone()));
        (
            Self {
                store,
                fanout,
                jobs,
                rescan,
            },
            PipelineHandle {
                cancel,
                worker: handle,
            },
        )
    }

    /// Persist a message, deliver it live, and queue it for embedding.
    ///
    /// Returns once the message is persisted and published. If persistence
    /// fails nothing is published or queued.
    pub async fn send(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        text: &str,
    ) -> Result<Message, ChatError> {
        let new = NewMessage::new(sender_id, receiver_id, text)?;
        tracing::trace!(sender_id, receiver_id, state = %MessageState::Received, "message received");

        let message = self.store.append(&new).await.map_err(|e| {
            tracing::error!(sender_id, receiver_id, error = %e, "failed to persist message");
            ChatError::Persistence(e.to_string())
        })?;
        tracing::debug!(message_id = message.id, state = %MessageState::Persisted, "message persisted");

        let delivered = self.fanout.publish(&message);
        tracing::debug!(
            message_id = message.id,
            state = %MessageState::Delivered,
            recipients = delivered.len(),
            "message published"
        );

        self.enqueue(&message);
        Ok(message)
    }

    /// Queue `message` for embedding without waiting.
    ///
    /// Returns `false` when the queue is full or closed. A job dropped on a
    /// full queue is picked up by the worker once the queue drains.
    pub fn enqueue(&self, message: &Message) -> bool {
        match self.jobs.try_send(EmbedJob::from(message)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                self.rescan.store(true, Ordering::Release);
                tracing::warn!(message_id = job.message_id, "embedding queue full, job deferred to rescan");
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::warn!(message_id = job.message_id, "embedding worker stopped, job dropped");
                false
            }
        }
    }

    /// Queue up to `limit` messages that still have no embedding.
    ///
    /// Waits for queue space instead of dropping jobs, and only fills the
    /// queue up to half its capacity so live sends keep room. Returns how
    /// many messages were queued.
    pub async fn backfill(&self, limit: usize) -> Result<usize, ChatError> {
        let pending = self.store.unembedded(limit).await?;
        let reserve = self.jobs.max_capacity() / 2;
        let mut queued = 0;
        for message in &pending {
            if !self.queue_with_reserve(EmbedJob::from(message), reserve).await {
                tracing::warn!("embedding worker stopped during backfill");
                break;
            }
            queued += 1;
        }
        if queued > 0 {
            tracing::info!(queued, "backfill queued unembedded messages");
        }
        Ok(queued)
    }

    /// Send `job` once more than `reserve` slots are free. Returns `false`
    /// if the worker has stopped.
    async fn queue_with_reserve(&self, mut job: EmbedJob, reserve: usize) -> bool {
        loop {
            if self.jobs.capacity() > reserve {
                match self.jobs.try_send(job) {
                    Ok(()) => return true,
                    Err(mpsc::error::TrySendError::Full(back)) => job = back,
                    Err(mpsc::error::TrySendError::Closed(_)) => return false,
                }
            } else if self.jobs.is_closed() {
                return false;
            }
            tokio::time::sleep(BACKFILL_POLL).await;
        }
    }

    /// Jobs waiting in the queue.
    pub fn pending_jobs(&self) -> usize {
        self.jobs.max_capacity() - self.jobs.capacity()
    }

    pub fn fanout(&self) -> &FanoutChannel {
        &self.fanout
    }
}
