//! SQLite message store (the plain backend).
//!
//! Implements `MessageStore` from `parley-core` using sqlx with split
//! read/write pools. Embeddings are kept inline as little-endian f32 blobs,
//! so search on this backend scores candidates in-process.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use parley_core::store::MessageStore;
use parley_types::embedding::Embedding;
use parley_types::error::RepositoryError;
use parley_types::message::{EmbeddingUpdate, Message, MessageId, NewMessage};
use parley_types::search::ConversationScope;
use sqlx::Row;
use tokio::sync::Mutex;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `MessageStore`.
pub struct SqliteMessageStore {
    pool: DatabasePool,
    /// Last timestamp handed out. Held across the INSERT so id order and
    /// timestamp order agree.
    clock: Mutex<DateTime<Utc>>,
}

impl SqliteMessageStore {
    /// Wrap `pool`, seeding the timestamp clock from the newest stored row.
    pub async fn open(pool: DatabasePool) -> Result<Self, RepositoryError> {
        let newest: Option<String> = sqlx::query_scalar("SELECT MAX(created_at) FROM messages")
            .fetch_one(&pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let last = match newest {
            Some(ts) => parse_datetime(&ts)?,
            None => DateTime::<Utc>::MIN_UTC,
        };

        Ok(Self {
            pool,
            clock: Mutex::new(last),
        })
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Fetch one message by id.
    pub async fn get(&self, id: MessageId) -> Result<Option<Message>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM messages WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => Ok(Some(MessageRow::from_row(&row)?.into_message()?)),
            None => Ok(None),
        }
    }

    /// Fetch several messages by id, in no particular order. Unknown ids are skipped.
    pub async fn get_many(&self, ids: &[MessageId]) -> Result<Vec<Message>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT {COLUMNS} FROM messages WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let rows = query
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        rows_to_messages(&rows)
    }

    /// Number of messages that already carry an embedding.
    pub async fn embedded_count(&self) -> Result<u64, RepositoryError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE embedding IS NOT NULL")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(n as u64)
    }

    /// Embedded messages with id greater than `after`, ascending, at most `limit`.
    pub async fn embedded_after(
        &self,
        after: MessageId,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM messages WHERE embedding IS NOT NULL AND id > ? \
             ORDER BY id ASC LIMIT ?"
        ))
        .bind(after)
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        rows_to_messages(&rows)
    }

    /// Next timestamp: now, or one microsecond past the last one if the
    /// wall clock has not moved forward.
    fn next_timestamp(last: DateTime<Utc>) -> DateTime<Utc> {
        let now = truncate_to_micros(Utc::now());
        if now > last {
            now
        } else {
            last + Duration::microseconds(1)
        }
    }
}

// ---------------------------------------------------------------------------
// Internal row type
// ---------------------------------------------------------------------------

const COLUMNS: &str = "id, sender_id, receiver_id, message, created_at, embedding";

struct MessageRow {
    id: i64,
    sender_id: i64,
    receiver_id: i64,
    message: String,
    created_at: String,
    embedding: Option<Vec<u8>>,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, RepositoryError> {
        let get = |e: sqlx::Error| RepositoryError::Query(e.to_string());
        Ok(Self {
            id: row.try_get("id").map_err(get)?,
            sender_id: row.try_get("sender_id").map_err(get)?,
            receiver_id: row.try_get("receiver_id").map_err(get)?,
            message: row.try_get("message").map_err(get)?,
            created_at: row.try_get("created_at").map_err(get)?,
            embedding: row.try_get("embedding").map_err(get)?,
        })
    }

    fn into_message(self) -> Result<Message, RepositoryError> {
        let embedding = match self.embedding {
            Some(bytes) => Some(Embedding::from_le_bytes(&bytes).ok_or_else(|| {
                RepositoryError::Query(format!("corrupt embedding blob on message {}", self.id))
            })?),
            None => None,
        };

        Ok(Message {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            text: self.message,
            created_at: parse_datetime(&self.created_at)?,
            embedding,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn rows_to_messages(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<Message>, RepositoryError> {
    let mut msgs = Vec::with_capacity(rows.len());
    for row in rows {
        msgs.push(MessageRow::from_row(row)?.into_message()?);
    }
    Ok(msgs)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width RFC 3339 so lexical order in SQLite is chronological order.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn truncate_to_micros(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(dt.timestamp_micros()).unwrap_or(dt)
}

/// SQL predicate and bind values selecting the messages in `scope`.
fn scope_predicate(scope: &ConversationScope) -> (&'static str, Vec<i64>) {
    match *scope {
        ConversationScope::Conversation {
            user_id,
            other_user_id,
        } => (
            "((sender_id = ? AND receiver_id = ?) OR (sender_id = ? AND receiver_id = ?))",
            vec![user_id, other_user_id, other_user_id, user_id],
        ),
        ConversationScope::AllOf { user_id } => {
            ("(sender_id = ? OR receiver_id = ?)", vec![user_id, user_id])
        }
    }
}

// ---------------------------------------------------------------------------
// MessageStore impl
// ---------------------------------------------------------------------------

impl MessageStore for SqliteMessageStore {
    async fn append(&self, message: &NewMessage) -> Result<Message, RepositoryError> {
        let mut clock = self.clock.lock().await;
        let created_at = Self::next_timestamp(*clock);

        let result = sqlx::query(
            "INSERT INTO messages (sender_id, receiver_id, message, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(message.sender_id)
        .bind(message.receiver_id)
        .bind(&message.text)
        .bind(format_datetime(&created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        *clock = created_at;

        Ok(Message {
            id: result.last_insert_rowid(),
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            text: message.text.clone(),
            created_at,
            embedding: None,
        })
    }

    async fn set_embedding(
        &self,
        id: MessageId,
        embedding: &Embedding,
        model_name: &str,
    ) -> Result<EmbeddingUpdate, RepositoryError> {
        let result = sqlx::query(
            "UPDATE messages SET embedding = ?, embedding_model = ? WHERE id = ? AND embedding IS NULL",
        )
        .bind(embedding.to_le_bytes())
        .bind(model_name)
        .bind(id)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 1 {
            return Ok(EmbeddingUpdate::Applied);
        }

        // Read through the writer so the check sees the row the UPDATE saw.
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(match exists {
            Some(_) => EmbeddingUpdate::AlreadySet,
            None => EmbeddingUpdate::NotFound,
        })
    }

    async fn fetch_history(
        &self,
        scope: &ConversationScope,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError> {
        let (predicate, binds) = scope_predicate(scope);
        let sql = format!(
            "SELECT {COLUMNS} FROM messages WHERE {predicate} \
             ORDER BY created_at DESC, id DESC LIMIT ?"
        );
        let mut query = sqlx::query(&sql);
        for b in binds {
            query = query.bind(b);
        }
        let rows = query
            .bind(limit as i64)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        rows_to_messages(&rows)
    }

    async fn unembedded(&self, limit: usize) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM messages WHERE embedding IS NULL ORDER BY id ASC LIMIT ?"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        rows_to_messages(&rows)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(n as u64)
    }

    fn supports_vector_query(&self) -> bool {
        false
    }

    async fn nearest_neighbors(
        &self,
        _scope: &ConversationScope,
        _query: &Embedding,
        _limit: usize,
    ) -> Result<Vec<(Message, f32)>, RepositoryError> {
        Err(RepositoryError::Unsupported("nearest_neighbors"))
    }

    async fn all_embedded(
        &self,
        scope: &ConversationScope,
    ) -> Result<Vec<(Message, Embedding)>, RepositoryError> {
        let (predicate, binds) = scope_predicate(scope);
        let sql = format!(
            "SELECT {COLUMNS} FROM messages WHERE embedding IS NOT NULL AND {predicate}"
        );
        let mut query = sqlx::query(&sql);
        for b in binds {
            query = query.bind(b);
        }
        let rows = query
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(rows_to_messages(&rows)?
            .into_iter()
            .filter_map(|msg| {
                let embedding = msg.embedding.clone()?;
                Some((msg, embedding))
            })
            .collect())
    }
}
