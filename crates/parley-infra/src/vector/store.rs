//! Vector-indexed message store: SQLite rows plus a LanceDB vector table.
//!
//! Message rows (text, timestamps, the canonical embedding blob) live in
//! SQLite through [`SqliteMessageStore`]. Every embedded message also gets a
//! row in the LanceDB `message_vectors` table, which answers
//! nearest-neighbor queries with cosine distance, prefiltered to the
//! caller's conversation scope.
//!
//! Write order for an embedding is LanceDB first, then SQLite. A crash in
//! between leaves a vector whose SQLite row is still unembedded; such
//! vectors are never returned and are replaced when backfill re-embeds the
//! message.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field};
use chrono::SecondsFormat;
use futures_util::TryStreamExt;
use lancedb::DistanceType;
use lancedb::index::Index;
use lancedb::index::vector::IvfPqIndexBuilder;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::table::OptimizeAction;
use parley_core::store::MessageStore;
use parley_types::embedding::Embedding;
use parley_types::error::RepositoryError;
use parley_types::message::{EmbeddingUpdate, Message, MessageId, NewMessage};
use parley_types::search::ConversationScope;
use tokio::sync::Mutex;

use super::lance::LanceVectorStore;
use super::schema::{MESSAGE_VECTORS_TABLE, message_vectors_schema, vector_dimension};
use crate::sqlite::SqliteMessageStore;

/// Row count at which an ANN index is built. Smaller tables are searched exactly.
pub const ANN_INDEX_MIN_ROWS: usize = 256;

/// Batch size when copying vectors from SQLite into LanceDB at open.
const SYNC_BATCH: usize = 512;

/// Embedding writes between table optimizations.
const OPTIMIZE_EVERY: usize = 64;

/// Candidates re-ranked with exact distances per requested hit, so indexed
/// results carry the same similarity as an exact scan.
const REFINE_FACTOR: u32 = 10;

pub struct LanceMessageStore {
    rows: SqliteMessageStore,
    table: lancedb::Table,
    dimension: usize,
    /// Serializes embedding writes across both databases.
    write_lock: Mutex<()>,
    /// Set once a cosine index build has been attempted (or found).
    index_attempted: AtomicBool,
    writes_since_optimize: AtomicUsize,
}

impl LanceMessageStore {
    /// Open the vector table and bring it in line with SQLite.
    ///
    /// Messages embedded while the service ran on the plain backend are
    /// copied into LanceDB here. Fails with `Conflict` if the existing table
    /// was built for a different vector width.
    pub async fn open(
        rows: SqliteMessageStore,
        vectors: &LanceVectorStore,
        dimension: usize,
    ) -> Result<Self, RepositoryError> {
        let schema = Arc::new(message_vectors_schema(dimension as i32));
        let table = vectors
            .ensure_table(MESSAGE_VECTORS_TABLE, schema)
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to open vector table: {e}")))?;

        let existing = table
            .schema()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to read vector schema: {e}")))?;
        if vector_dimension(&existing) != Some(dimension as i32) {
            return Err(RepositoryError::Conflict(format!(
                "vector table width {:?} does not match embedding dimension {dimension}",
                vector_dimension(&existing)
            )));
        }

        let index_ready = cosine_index_present(&table).await?;

        let store = Self {
            rows,
            table,
            dimension,
            write_lock: Mutex::new(()),
            index_attempted: AtomicBool::new(index_ready),
            writes_since_optimize: AtomicUsize::new(0),
        };

        let copied = store.sync_from_rows().await?;
        if copied > 0 {
            tracing::info!(copied, "copied vectors from SQLite into LanceDB");
        }
        store.maybe_build_index().await;
        Ok(store)
    }

    /// Number of rows in the vector table.
    pub async fn vector_count(&self) -> Result<usize, RepositoryError> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to count rows: {e}")))
    }

    /// Copy SQLite embeddings missing from the vector table.
    async fn sync_from_rows(&self) -> Result<usize, RepositoryError> {
        let embedded = self.rows.embedded_count().await? as usize;
        if self.vector_count().await? >= embedded {
            return Ok(0);
        }

        let present = self.vector_ids().await?;
        let mut copied = 0;
        let mut after: MessageId = 0;
        loop {
            let page = self.rows.embedded_after(after, SYNC_BATCH).await?;
            let Some(last) = page.last() else { break };
            after = last.id;

            let missing: Vec<Message> = page
                .into_iter()
                .filter(|m| !present.contains(&m.id))
                .filter(|m| {
                    m.embedding
                        .as_ref()
                        .is_some_and(|e| e.dimension() == self.dimension)
                })
                .collect();
            if missing.is_empty() {
                continue;
            }
            copied += missing.len();
            self.add_vectors(&missing, "unknown").await?;
        }
        Ok(copied)
    }

    async fn vector_ids(&self) -> Result<HashSet<MessageId>, RepositoryError> {
        let batches: Vec<RecordBatch> = self
            .table
            .query()
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Vector scan failed: {e}")))?
            .try_collect()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to collect results: {e}")))?;

        let mut ids = HashSet::new();
        for batch in &batches {
            if let Some(col) = id_column(batch) {
                ids.extend(col.values().iter().copied());
            }
        }
        Ok(ids)
    }

    async fn add_vectors(&self, messages: &[Message], model_name: &str) -> Result<(), RepositoryError> {
        let batch = build_record_batch(messages, model_name, self.dimension)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        self.table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to add vectors: {e}")))?;
        Ok(())
    }

    /// Build the ANN index once the table is large enough. Failures are
    /// logged and leave search exact.
    ///
    /// The index is trained for cosine distance, the metric every query
    /// uses; lance ignores an index trained for another metric.
    async fn maybe_build_index(&self) {
        if self.index_attempted.load(Ordering::Acquire) {
            return;
        }
        let rows = match self.vector_count().await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "could not count vectors for indexing");
                return;
            }
        };
        if rows < ANN_INDEX_MIN_ROWS {
            return;
        }
        self.index_attempted.store(true, Ordering::Release);

        let index = Index::IvfPq(IvfPqIndexBuilder::default().distance_type(DistanceType::Cosine));
        match self
            .table
            .create_index(&["vector"], index)
            .replace(true)
            .execute()
            .await
        {
            Ok(_) => tracing::info!(rows, "built ANN index on message vectors"),
            Err(e) => tracing::warn!(rows, error = %e, "ANN index build failed, search stays exact"),
        }
    }

    /// Compact small fragments, prune old versions, and fold new vectors
    /// into the index every `OPTIMIZE_EVERY` writes.
    async fn maybe_optimize(&self) {
        let writes = self.writes_since_optimize.fetch_add(1, Ordering::AcqRel) + 1;
        if writes < OPTIMIZE_EVERY {
            return;
        }
        self.writes_since_optimize.store(0, Ordering::Release);

        match self.table.optimize(OptimizeAction::All).await {
            Ok(_) => tracing::debug!(writes, "optimized message vector table"),
            Err(e) => tracing::warn!(error = %e, "vector table optimize failed"),
        }
    }

    /// Whether a vector row for `id` exists, e.g. left by an interrupted write.
    async fn has_vector(&self, id: MessageId) -> Result<bool, RepositoryError> {
        let n = self
            .table
            .count_rows(Some(format!("id = {id}")))
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to count rows: {e}")))?;
        Ok(n > 0)
    }
}

/// True if the `vector` column carries an index trained for cosine distance.
async fn cosine_index_present(table: &lancedb::Table) -> Result<bool, RepositoryError> {
    let indices = table
        .list_indices()
        .await
        .map_err(|e| RepositoryError::Query(format!("Failed to list indices: {e}")))?;

    for idx in indices
        .iter()
        .filter(|idx| idx.columns.iter().any(|c| c == "vector"))
    {
        let stats = table
            .index_stats(&idx.name)
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to read index stats: {e}")))?;
        if stats.and_then(|s| s.distance_type) == Some(DistanceType::Cosine) {
            return Ok(true);
        }
        tracing::info!(index = %idx.name, "vector index not trained for cosine distance, will rebuild");
    }
    Ok(false)
}

// ---------------------------------------------------------------------------
// Arrow helpers
// ---------------------------------------------------------------------------

/// Build a RecordBatch with one row per message. Every message must carry
/// an embedding of width `dimension`.
fn build_record_batch(
    messages: &[Message],
    model_name: &str,
    dimension: usize,
) -> Result<RecordBatch, RepositoryError> {
    let schema = Arc::new(message_vectors_schema(dimension as i32));

    let mut flat = Vec::with_capacity(messages.len() * dimension);
    for msg in messages {
        let embedding = msg.embedding.as_ref().ok_or_else(|| {
            RepositoryError::Query(format!("message {} has no embedding", msg.id))
        })?;
        flat.extend_from_slice(embedding.as_slice());
    }

    let field = Arc::new(Field::new("item", DataType::Float32, true));
    let vectors = FixedSizeListArray::try_new(
        field,
        dimension as i32,
        Arc::new(Float32Array::from(flat)),
        None,
    )
    .map_err(|e| RepositoryError::Query(format!("Failed to build vector column: {e}")))?;

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from_iter_values(messages.iter().map(|m| m.id))),
            Arc::new(Int64Array::from_iter_values(messages.iter().map(|m| m.sender_id))),
            Arc::new(Int64Array::from_iter_values(messages.iter().map(|m| m.receiver_id))),
            Arc::new(StringArray::from_iter_values(messages.iter().map(|m| {
                m.created_at.to_rfc3339_opts(SecondsFormat::Micros, true)
            }))),
            Arc::new(StringArray::from_iter_values(
                messages.iter().map(|_| model_name),
            )),
            Arc::new(vectors),
        ],
    )
    .map_err(|e| RepositoryError::Query(format!("Failed to build record batch: {e}")))
}

fn id_column(batch: &RecordBatch) -> Option<&Int64Array> {
    batch
        .column_by_name("id")
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
}

/// LanceDB filter selecting the vectors in `scope`. Ids are integers, so
/// formatting them into the predicate is safe.
fn scope_filter(scope: &ConversationScope) -> String {
    match *scope {
        ConversationScope::Conversation {
            user_id,
            other_user_id,
        } => format!(
            "(sender_id = {user_id} AND receiver_id = {other_user_id}) \
             OR (sender_id = {other_user_id} AND receiver_id = {user_id})"
        ),
        ConversationScope::AllOf { user_id } => {
            format!("sender_id = {user_id} OR receiver_id = {user_id}")
        }
    }
}

// ---------------------------------------------------------------------------
// MessageStore impl
// ---------------------------------------------------------------------------

impl MessageStore for LanceMessageStore {
    async fn append(&self, message: &NewMessage) -> Result<Message, RepositoryError> {
        self.rows.append(message).await
    }

    async fn set_embedding(
        &self,
        id: MessageId,
        embedding: &Embedding,
        model_name: &str,
    ) -> Result<EmbeddingUpdate, RepositoryError> {
        if embedding.dimension() != self.dimension {
            return Err(RepositoryError::Conflict(format!(
                "embedding has {} dimensions, vector table expects {}",
                embedding.dimension(),
                self.dimension
            )));
        }

        let update = {
            let _guard = self.write_lock.lock().await;

            let mut message = match self.rows.get(id).await? {
                None => return Ok(EmbeddingUpdate::NotFound),
                Some(m) if m.embedding.is_some() => return Ok(EmbeddingUpdate::AlreadySet),
                Some(m) => m,
            };

            // Drop any vector left behind by an interrupted earlier write.
            if self.has_vector(id).await? {
                self.table
                    .delete(&format!("id = {id}"))
                    .await
                    .map_err(|e| RepositoryError::Query(format!("Failed to clear vector: {e}")))?;
            }

            message.embedding = Some(embedding.clone());
            self.add_vectors(std::slice::from_ref(&message), model_name)
                .await?;

            self.rows.set_embedding(id, embedding, model_name).await?
        };

        self.maybe_build_index().await;
        self.maybe_optimize().await;
        Ok(update)
    }

    async fn fetch_history(
        &self,
        scope: &ConversationScope,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError> {
        self.rows.fetch_history(scope, limit).await
    }

    async fn unembedded(&self, limit: usize) -> Result<Vec<Message>, RepositoryError> {
        self.rows.unembedded(limit).await
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        self.rows.count().await
    }

    fn supports_vector_query(&self) -> bool {
        true
    }

    async fn nearest_neighbors(
        &self,
        scope: &ConversationScope,
        query: &Embedding,
        limit: usize,
    ) -> Result<Vec<(Message, f32)>, RepositoryError> {
        if limit == 0 || self.vector_count().await? == 0 {
            return Ok(Vec::new());
        }

        let batches: Vec<RecordBatch> = self
            .table
            .vector_search(query.as_slice())
            .map_err(|e| RepositoryError::Query(format!("Vector search setup failed: {e}")))?
            .distance_type(DistanceType::Cosine)
            .refine_factor(REFINE_FACTOR)
            .only_if(scope_filter(scope))
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RepositoryError::Query(format!("Vector search failed: {e}")))?
            .try_collect()
            .await
            .map_err(|e| RepositoryError::Query(format!("Failed to collect results: {e}")))?;

        let mut hits: Vec<(MessageId, f32)> = Vec::new();
        for batch in &batches {
            let (Some(ids), Some(distances)) = (
                id_column(batch),
                batch
                    .column_by_name("_distance")
                    .and_then(|c| c.as_any().downcast_ref::<Float32Array>()),
            ) else {
                continue;
            };
            for i in 0..batch.num_rows() {
                hits.push((ids.value(i), distances.value(i)));
            }
        }
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));

        let ids: Vec<MessageId> = hits.iter().map(|(id, _)| *id).collect();
        let mut by_id: HashMap<MessageId, Message> = self
            .rows
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        Ok(hits
            .into_iter()
            .filter_map(|(id, distance)| {
                let msg = by_id.remove(&id)?;
                (msg.is_searchable() && scope.includes(&msg)).then_some((msg, distance))
            })
            .collect())
    }

    async fn all_embedded(
        &self,
        scope: &ConversationScope,
    ) -> Result<Vec<(Message, Embedding)>, RepositoryError> {
        self.rows.all_embedded(scope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::DatabasePool;

    const DIM: usize = 4;

    struct Fixture {
        store: LanceMessageStore,
        _dir: tempfile::TempDir,
    }

    async fn open_in(dir: &std::path::Path) -> LanceMessageStore {
        let url = format!("sqlite://{}?mode=rwc", dir.join("msgs.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        let rows = SqliteMessageStore::open(pool).await.unwrap();
        let vectors = LanceVectorStore::open(&dir.join("vectors")).await.unwrap();
        LanceMessageStore::open(rows, &vectors, DIM).await.unwrap()
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        Fixture {
            store: open_in(dir.path()).await,
            _dir: dir,
        }
    }

    fn unit(values: [f32; DIM]) -> Embedding {
        Embedding::new(values.to_vec()).l2_normalized()
    }

    async fn embedded(store: &LanceMessageStore, s: i64, r: i64, text: &str, v: [f32; DIM]) -> Message {
        let msg = store
            .append(&NewMessage::new(s, r, text).unwrap())
            .await
            .unwrap();
        assert_eq!(
            store.set_embedding(msg.id, &unit(v), "test").await.unwrap(),
            EmbeddingUpdate::Applied
        );
        msg
    }

    #[tokio::test]
    async fn nearest_neighbors_orders_by_distance() {
        let f = fixture().await;
        let near = embedded(&f.store, 1, 2, "near", [1.0, 0.1, 0.0, 0.0]).await;
        let mid = embedded(&f.store, 2, 1, "mid", [1.0, 1.0, 0.0, 0.0]).await;
        let far = embedded(&f.store, 1, 2, "far", [0.0, 0.0, 1.0, 0.0]).await;

        let hits = f
            .store
            .nearest_neighbors(&ConversationScope::all_of(1), &unit([1.0, 0.0, 0.0, 0.0]), 10)
            .await
            .unwrap();

        let ids: Vec<i64> = hits.iter().map(|(m, _)| m.id).collect();
        assert_eq!(ids, vec![near.id, mid.id, far.id]);
        assert!(hits[0].1 < hits[1].1 && hits[1].1 < hits[2].1);
        assert!(hits[0].1.abs() < 0.01);
        assert!(hits.iter().all(|(m, _)| m.embedding.is_some()));
    }

    #[tokio::test]
    async fn nearest_neighbors_respects_scope() {
        let f = fixture().await;
        embedded(&f.store, 1, 2, "ours", [0.0, 1.0, 0.0, 0.0]).await;
        let other = embedded(&f.store, 3, 4, "theirs", [1.0, 0.0, 0.0, 0.0]).await;
        embedded(&f.store, 1, 3, "with carol", [1.0, 0.0, 0.0, 0.0]).await;

        let hits = f
            .store
            .nearest_neighbors(
                &ConversationScope::conversation(2, 1),
                &unit([1.0, 0.0, 0.0, 0.0]),
                10,
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.text, "ours");

        let all_of_one = f
            .store
            .nearest_neighbors(&ConversationScope::all_of(1), &unit([1.0, 0.0, 0.0, 0.0]), 10)
            .await
            .unwrap();
        assert_eq!(all_of_one.len(), 2);
        assert!(all_of_one.iter().all(|(m, _)| m.id != other.id));
    }

    #[tokio::test]
    async fn unembedded_messages_have_no_vectors() {
        let f = fixture().await;
        f.store
            .append(&NewMessage::new(1, 2, "pending").unwrap())
            .await
            .unwrap();

        let hits = f
            .store
            .nearest_neighbors(&ConversationScope::all_of(1), &unit([1.0, 0.0, 0.0, 0.0]), 10)
            .await
            .unwrap();
        assert!(hits.is_empty());
        assert_eq!(f.store.vector_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn set_embedding_is_once_only_across_both_stores() {
        let f = fixture().await;
        let msg = embedded(&f.store, 1, 2, "once", [1.0, 0.0, 0.0, 0.0]).await;

        assert_eq!(
            f.store
                .set_embedding(msg.id, &unit([0.0, 1.0, 0.0, 0.0]), "test")
                .await
                .unwrap(),
            EmbeddingUpdate::AlreadySet
        );
        assert_eq!(
            f.store
                .set_embedding(424242, &unit([0.0, 1.0, 0.0, 0.0]), "test")
                .await
                .unwrap(),
            EmbeddingUpdate::NotFound
        );
        assert_eq!(f.store.vector_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn stale_vector_is_replaced_and_writes_survive_optimize() {
        let f = fixture().await;
        let mut msg = f
            .store
            .append(&NewMessage::new(1, 2, "interrupted").unwrap())
            .await
            .unwrap();

        // A vector written before a crash, with the SQLite row still unembedded.
        msg.embedding = Some(unit([0.0, 0.0, 0.0, 1.0]));
        f.store.add_vectors(std::slice::from_ref(&msg), "test").await.unwrap();
        assert!(f.store.has_vector(msg.id).await.unwrap());

        f.store
            .set_embedding(msg.id, &unit([1.0, 0.0, 0.0, 0.0]), "test")
            .await
            .unwrap();
        assert_eq!(f.store.vector_count().await.unwrap(), 1);

        for i in 0..OPTIMIZE_EVERY {
            embedded(&f.store, 1, 2, &format!("m{i}"), [0.0, 1.0, i as f32, 0.0]).await;
        }
        assert_eq!(f.store.vector_count().await.unwrap(), OPTIMIZE_EVERY + 1);
        assert!(!f.store.has_vector(424242).await.unwrap());

        let hits = f
            .store
            .nearest_neighbors(&ConversationScope::all_of(1), &unit([1.0, 0.0, 0.0, 0.0]), 1)
            .await
            .unwrap();
        assert_eq!(hits[0].0.text, "interrupted");
    }

    #[tokio::test]
    async fn wrong_width_embedding_is_rejected() {
        let f = fixture().await;
        let msg = f
            .store
            .append(&NewMessage::new(1, 2, "x").unwrap())
            .await
            .unwrap();
        let err = f
            .store
            .set_embedding(msg.id, &Embedding::new(vec![1.0; DIM + 1]), "test")
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn reopen_copies_vectors_embedded_by_plain_backend() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("msgs.db").display());

        // Embed through the plain store only, as after a fallback period.
        {
            let pool = DatabasePool::new(&url).await.unwrap();
            let plain = SqliteMessageStore::open(pool.clone()).await.unwrap();
            for (i, v) in [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0]].iter().enumerate() {
                let msg = plain
                    .append(&NewMessage::new(1, 2, format!("m{i}")).unwrap())
                    .await
                    .unwrap();
                plain.set_embedding(msg.id, &unit(*v), "test").await.unwrap();
            }
            pool.close().await;
        }

        let store = open_in(dir.path()).await;
        assert_eq!(store.vector_count().await.unwrap(), 2);

        let hits = store
            .nearest_neighbors(&ConversationScope::all_of(2), &unit([0.0, 1.0, 0.0, 0.0]), 1)
            .await
            .unwrap();
        assert_eq!(hits[0].0.text, "m1");
    }

    fn spread(i: usize) -> [f32; DIM] {
        let a = i as f32 * 0.37;
        let b = i as f32 * 0.11;
        [a.cos(), a.sin(), b.cos(), b.sin()]
    }

    #[tokio::test]
    async fn large_table_gets_cosine_index_that_matches_exact_scan() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("msgs.db").display());
        let total = ANN_INDEX_MIN_ROWS + 44;

        {
            let pool = DatabasePool::new(&url).await.unwrap();
            let plain = SqliteMessageStore::open(pool.clone()).await.unwrap();
            for i in 0..total {
                let msg = plain
                    .append(&NewMessage::new(1, 2, format!("m{i}")).unwrap())
                    .await
                    .unwrap();
                plain.set_embedding(msg.id, &unit(spread(i)), "test").await.unwrap();
            }
            pool.close().await;
        }

        let store = open_in(dir.path()).await;
        assert_eq!(store.vector_count().await.unwrap(), total);

        let indices = store.table.list_indices().await.unwrap();
        let vector_index = indices
            .iter()
            .find(|idx| idx.columns.iter().any(|c| c == "vector"))
            .expect("vector index");
        let stats = store.table.index_stats(&vector_index.name).await.unwrap().unwrap();
        assert_eq!(stats.distance_type, Some(DistanceType::Cosine));
        assert!(cosine_index_present(&store.table).await.unwrap());

        let scope = ConversationScope::all_of(1);
        let exact = store.all_embedded(&scope).await.unwrap();
        for target in [3usize, 97, 211] {
            let query = unit(spread(target));
            let hits = store.nearest_neighbors(&scope, &query, 5).await.unwrap();

            let (best, best_sim) = exact
                .iter()
                .map(|(m, e)| (m, e.cosine_similarity(&query)))
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .unwrap();
            assert_eq!(hits[0].0.id, best.id);
            assert!((1.0 - hits[0].1 - best_sim).abs() < 1e-3);
        }
    }

    #[tokio::test]
    async fn reopen_with_different_dimension_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        drop(open_in(dir.path()).await);

        let url = format!("sqlite://{}?mode=rwc", dir.path().join("msgs.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        let rows = SqliteMessageStore::open(pool).await.unwrap();
        let vectors = LanceVectorStore::open(&dir.path().join("vectors")).await.unwrap();

        let result = LanceMessageStore::open(rows, &vectors, DIM * 2).await;
        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
    }

    #[test]
    fn scope_filter_covers_both_directions() {
        assert_eq!(
            scope_filter(&ConversationScope::conversation(1, 2)),
            "(sender_id = 1 AND receiver_id = 2) OR (sender_id = 2 AND receiver_id = 1)"
        );
        assert_eq!(
            scope_filter(&ConversationScope::all_of(7)),
            "sender_id = 7 OR receiver_id = 7"
        );
    }

    #[test]
    fn record_batch_requires_embeddings() {
        let msg = Message {
            id: 1,
            sender_id: 1,
            receiver_id: 2,
            text: "t".to_string(),
            created_at: chrono::Utc::now(),
            embedding: None,
        };
        assert!(build_record_batch(&[msg], "m", DIM).is_err());
    }
}
