//! fastembed (ONNX) local embedding model.
//!
//! The ONNX session is CPU-bound and not meant to be shared across async
//! tasks, so the model is owned by a dedicated OS thread. Requests reach it
//! through a bounded channel and are answered over a oneshot.

use std::path::Path;
use std::thread::JoinHandle;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parley_core::embedding::Embedder;
use parley_types::error::EmbeddingError;
use tokio::sync::{mpsc, oneshot};

/// Requests queued for the model thread before senders wait.
const REQUEST_QUEUE: usize = 64;

struct EmbedRequest {
    texts: Vec<String>,
    reply: oneshot::Sender<Result<Vec<Vec<f32>>, EmbeddingError>>,
}

/// Map a configured model name to the fastembed model and its output width.
pub fn parse_model(name: &str) -> Option<(EmbeddingModel, usize)> {
    match name.to_lowercase().as_str() {
        "all-minilm-l6-v2" | "allminilml6v2" => Some((EmbeddingModel::AllMiniLML6V2, 384)),
        "all-minilm-l12-v2" | "allminilml12v2" => Some((EmbeddingModel::AllMiniLML12V2, 384)),
        "bge-small-en-v1.5" | "bge-small-en" => Some((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" | "bge-base-en" => Some((EmbeddingModel::BGEBaseENV15, 768)),
        _ => None,
    }
}

/// Sentence-embedding model running in-process.
pub struct FastEmbedder {
    sender: Option<mpsc::Sender<EmbedRequest>>,
    thread: Option<JoinHandle<()>>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedder {
    /// Load `model_name`, downloading weights into `cache_dir` on first use.
    ///
    /// Blocks until the model is ready; call from `spawn_blocking` in async code.
    pub fn load(model_name: &str, cache_dir: &Path) -> Result<Self, EmbeddingError> {
        let (model, dimension) = parse_model(model_name).ok_or_else(|| {
            EmbeddingError::ProviderUnavailable(format!("unknown embedding model '{model_name}'"))
        })?;

        let options = InitOptions::new(model)
            .with_cache_dir(cache_dir.to_path_buf())
            .with_show_download_progress(false);

        let (sender, receiver) = mpsc::channel::<EmbedRequest>(REQUEST_QUEUE);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), String>>();

        let thread_model = model_name.to_string();
        let thread = std::thread::Builder::new()
            .name("parley-embedder".to_string())
            .spawn(move || {
                let mut model = match TextEmbedding::try_new(options) {
                    Ok(model) => {
                        let _ = ready_tx.send(Ok(()));
                        model
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                serve(&mut model, receiver, &thread_model);
            })
            .map_err(|e| {
                EmbeddingError::ProviderUnavailable(format!("failed to start embedder thread: {e}"))
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                tracing::info!(model = model_name, dimension, "embedding model loaded");
                Ok(Self {
                    sender: Some(sender),
                    thread: Some(thread),
                    model_name: model_name.to_string(),
                    dimension,
                })
            }
            Ok(Err(reason)) => {
                let _ = thread.join();
                Err(EmbeddingError::ProviderUnavailable(format!(
                    "failed to load embedding model '{model_name}': {reason}"
                )))
            }
            Err(_) => {
                let _ = thread.join();
                Err(EmbeddingError::ProviderUnavailable(
                    "embedder thread exited during load".to_string(),
                ))
            }
        }
    }
}

fn serve(model: &mut TextEmbedding, mut receiver: mpsc::Receiver<EmbedRequest>, model_name: &str) {
    while let Some(request) = receiver.blocking_recv() {
        let refs: Vec<&str> = request.texts.iter().map(String::as_str).collect();
        let result = model.embed(refs, None).map_err(|e| {
            tracing::warn!(model = model_name, error = %e, "embedding inference failed");
            EmbeddingError::ProviderUnavailable(format!("inference failed: {e}"))
        });
        // The caller may have given up; nothing to do then.
        let _ = request.reply.send(result);
    }
    tracing::debug!(model = model_name, "embedder thread stopped");
}

impl Embedder for FastEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| EmbeddingError::ProviderUnavailable("embedder shut down".to_string()))?;

        let (reply, rx) = oneshot::channel();
        sender
            .send(EmbedRequest {
                texts: texts.to_vec(),
                reply,
            })
            .await
            .map_err(|_| EmbeddingError::ProviderUnavailable("embedder thread stopped".to_string()))?;

        rx.await.unwrap_or_else(|_| {
            Err(EmbeddingError::ProviderUnavailable(
                "embedder dropped the request".to_string(),
            ))
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

impl Drop for FastEmbedder {
    fn drop(&mut self) {
        // Closing the channel ends the thread's receive loop.
        self.sender.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("embedder thread panicked");
            }
        }
    }
}
