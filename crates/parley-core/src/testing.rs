//! In-memory fakes shared by the unit tests in this crate.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parley_types::embedding::Embedding;
use parley_types::error::{EmbeddingError, RepositoryError};
use parley_types::message::{EmbeddingUpdate, Message, MessageId, NewMessage};
use parley_types::search::ConversationScope;
use tokio::sync::Semaphore;

use crate::embedding::{BoxEmbedder, Embedder, EmbeddingProvider};
use crate::store::MessageStore;

pub const TEST_DIMENSION: usize = 16;

/// Texts containing this marker fail to embed.
pub const FAIL_MARKER: &str = "[embed-fail]";

const CONCEPTS: &[&[&str]] = &[
    &["meet", "meeting", "meetup", "when", "3pm", "pm", "schedule", "time"],
    &["homework", "due", "assignment", "class", "exam", "tomorrow"],
    &["lunch", "dinner", "pizza", "eat", "hungry"],
    &["rain", "sunny", "weather", "umbrella"],
];

/// Deterministic bag-of-concepts embedder.
///
/// Words from the same concept group land on the same dimension, so
/// "when are we meeting" is close to "let's meet at 3pm". Other words are
/// hashed into the remaining dimensions.
pub struct KeywordEmbedder {
    calls: Arc<AtomicUsize>,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut v = vec![0.0_f32; TEST_DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            match CONCEPTS.iter().position(|group| group.contains(&word.as_str())) {
                Some(dim) => v[dim] += 1.0,
                None => {
                    let spare = TEST_DIMENSION - CONCEPTS.len();
                    v[CONCEPTS.len() + (fnv1a(&word) as usize % spare)] += 0.25;
                }
            }
        }
        v
    }
}

impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if texts.iter().any(|t| t.contains(FAIL_MARKER)) {
            return Err(EmbeddingError::ProviderUnavailable(
                "forced failure".to_string(),
            ));
        }
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }

    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }
}

/// Embedder whose first `failures` calls fail.
pub struct FlakyEmbedder {
    remaining_failures: AtomicUsize,
}

impl FlakyEmbedder {
    pub fn new(failures: usize) -> Self {
        Self {
            remaining_failures: AtomicUsize::new(failures),
        }
    }
}

impl Embedder for FlakyEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(EmbeddingError::ProviderUnavailable("warming up".to_string()));
        }
        Ok(texts.iter().map(|t| KeywordEmbedder::vector_for(t)).collect())
    }

    fn model_name(&self) -> &str {
        "flaky-test"
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }
}

/// Embedder that blocks until the test hands out permits.
pub struct GatedEmbedder {
    gate: Arc<Semaphore>,
}

impl GatedEmbedder {
    pub fn new() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Self {
                gate: Arc::clone(&gate),
            },
            gate,
        )
    }
}

impl Embedder for GatedEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| EmbeddingError::ProviderUnavailable("gate closed".to_string()))?;
        permit.forget();
        Ok(texts.iter().map(|t| KeywordEmbedder::vector_for(t)).collect())
    }

    fn model_name(&self) -> &str {
        "gated-test"
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }
}

pub fn provider<E: Embedder + 'static>(embedder: E) -> Arc<EmbeddingProvider> {
    Arc::new(EmbeddingProvider::new(
        BoxEmbedder::new(embedder),
        Duration::from_secs(60),
        1000,
    ))
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in s.bytes() {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// Vec-backed store with a switchable vector capability.
///
/// In vector-indexed mode `nearest_neighbors` does an exact scan, which is
/// what an ANN index converges to on small data.
pub struct MemoryStore {
    messages: Mutex<Vec<Message>>,
    vector_index: bool,
    fail_appends: AtomicBool,
}

impl MemoryStore {
    pub fn plain() -> Self {
        Self::with_capability(false)
    }

    pub fn vector_indexed() -> Self {
        Self::with_capability(true)
    }

    fn with_capability(vector_index: bool) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            vector_index,
            fail_appends: AtomicBool::new(false),
        }
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, id: MessageId) -> Option<Message> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    pub fn unembedded_count(&self) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.embedding.is_none())
            .count()
    }

    /// Insert an already-embedded message with an explicit timestamp.
    pub fn seed(&self, text: &str, sender: i64, receiver: i64, at: DateTime<Utc>, vector: Vec<f32>) -> MessageId {
        let mut messages = self.messages.lock().unwrap();
        let id = messages.len() as MessageId + 1;
        messages.push(Message {
            id,
            sender_id: sender,
            receiver_id: receiver,
            text: text.to_string(),
            created_at: at,
            embedding: Some(Embedding::new(vector).l2_normalized()),
        });
        id
    }

    fn in_scope(&self, scope: &ConversationScope) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| scope.includes(m))
            .cloned()
            .collect()
    }
}

impl MessageStore for MemoryStore {
    async fn append(&self, message: &NewMessage) -> Result<Message, RepositoryError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("disk I/O error".to_string()));
        }
        let mut messages = self.messages.lock().unwrap();
        let now = Utc::now();
        let created_at = match messages.last() {
            Some(last) if last.created_at >= now => last.created_at + chrono::Duration::microseconds(1),
            _ => now,
        };
        let stored = Message {
            id: messages.len() as MessageId + 1,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            text: message.text.clone(),
            created_at,
            embedding: None,
        };
        messages.push(stored.clone());
        Ok(stored)
    }

    async fn set_embedding(
        &self,
        id: MessageId,
        embedding: &Embedding,
        _model_name: &str,
    ) -> Result<EmbeddingUpdate, RepositoryError> {
        let mut messages = self.messages.lock().unwrap();
        match messages.iter_mut().find(|m| m.id == id) {
            None => Ok(EmbeddingUpdate::NotFound),
            Some(m) if m.embedding.is_some() => Ok(EmbeddingUpdate::AlreadySet),
            Some(m) => {
                m.embedding = Some(embedding.clone());
                Ok(EmbeddingUpdate::Applied)
            }
        }
    }

    async fn fetch_history(
        &self,
        scope: &ConversationScope,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError> {
        let mut msgs = self.in_scope(scope);
        msgs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        msgs.truncate(limit);
        Ok(msgs)
    }

    async fn unembedded(&self, limit: usize) -> Result<Vec<Message>, RepositoryError> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.embedding.is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(self.messages.lock().unwrap().len() as u64)
    }

    fn supports_vector_query(&self) -> bool {
        self.vector_index
    }

    async fn nearest_neighbors(
        &self,
        scope: &ConversationScope,
        query: &Embedding,
        limit: usize,
    ) -> Result<Vec<(Message, f32)>, RepositoryError> {
        if !self.vector_index {
            return Err(RepositoryError::Unsupported("nearest_neighbors"));
        }
        let mut hits: Vec<(Message, f32)> = self
            .in_scope(scope)
            .into_iter()
            .filter_map(|m| {
                let distance = 1.0 - m.embedding.as_ref()?.cosine_similarity(query);
                Some((m, distance))
            })
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn all_embedded(
        &self,
        scope: &ConversationScope,
    ) -> Result<Vec<(Message, Embedding)>, RepositoryError> {
        Ok(self
            .in_scope(scope)
            .into_iter()
            .filter_map(|m| {
                let e = m.embedding.clone()?;
                Some((m, e))
            })
            .collect())
    }
}

/// Poll until `check` passes or two seconds elapse.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Wait (bounded) until the store reports no unembedded messages.
pub async fn wait_until_embedded<S: MessageStore>(store: &S, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match store.unembedded(1).await {
            Ok(rest) if rest.is_empty() => return true,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "could not check embedding progress");
                return false;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
