//! Service configuration types for Parley.
//!
//! `ChatConfig` represents the top-level `config.toml` that controls the
//! storage backend, embedding model, queueing, and search behaviour.

use serde::{Deserialize, Serialize};

/// Which message store backend to open at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// SQLite rows plus a LanceDB vector index (nearest-neighbor queries).
    Lance,
    /// SQLite only; search scores candidates in-process.
    Sqlite,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Lance => write!(f, "lance"),
            StoreBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Top-level configuration for the Parley service.
///
/// Loaded from `~/.parley/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_store_backend")]
    pub store_backend: StoreBackend,

    /// fastembed model name (e.g., "all-minilm-l6-v2", "bge-small-en-v1.5").
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Time-to-live of memoized embeddings, in seconds.
    #[serde(default = "default_embed_cache_ttl_secs")]
    pub embed_cache_ttl_secs: u64,

    /// Maximum number of memoized embeddings.
    #[serde(default = "default_embed_cache_capacity")]
    pub embed_cache_capacity: u64,

    /// Bound on pending embedding jobs. New jobs are rejected when full.
    #[serde(default = "default_embed_queue_capacity")]
    pub embed_queue_capacity: usize,

    /// Extra attempts after a failed embedding (0 disables retry).
    #[serde(default = "default_embed_retries")]
    pub embed_retries: u32,

    /// Per-user broadcast buffer for live delivery.
    #[serde(default = "default_fanout_capacity")]
    pub fanout_capacity: usize,

    #[serde(default = "default_history_limit")]
    pub default_history_limit: usize,

    /// Drop search hits below this similarity. Unset keeps every hit.
    #[serde(default)]
    pub min_similarity: Option<f32>,
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Lance
}

fn default_embedding_model() -> String {
    "all-minilm-l6-v2".to_string()
}

fn default_embed_cache_ttl_secs() -> u64 {
    300
}

fn default_embed_cache_capacity() -> u64 {
    10_000
}

fn default_embed_queue_capacity() -> usize {
    1024
}

fn default_embed_retries() -> u32 {
    2
}

fn default_fanout_capacity() -> usize {
    256
}

fn default_history_limit() -> usize {
    50
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            store_backend: default_store_backend(),
            embedding_model: default_embedding_model(),
            embed_cache_ttl_secs: default_embed_cache_ttl_secs(),
            embed_cache_capacity: default_embed_cache_capacity(),
            embed_queue_capacity: default_embed_queue_capacity(),
            embed_retries: default_embed_retries(),
            fanout_capacity: default_fanout_capacity(),
            default_history_limit: default_history_limit(),
            min_similarity: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_config_default_values() {
        let config = ChatConfig::default();
        assert_eq!(config.store_backend, StoreBackend::Lance);
        assert_eq!(config.embed_queue_capacity, 1024);
        assert_eq!(config.embed_retries, 2);
        assert!(config.min_similarity.is_none());
    }

    #[test]
    fn test_chat_config_deserialize_with_defaults() {
        let config: ChatConfig = toml::from_str("").unwrap();
        assert_eq!(config.store_backend, StoreBackend::Lance);
        assert_eq!(config.embedding_model, "all-minilm-l6-v2");
        assert_eq!(config.default_history_limit, 50);
    }

    #[test]
    fn test_chat_config_deserialize_with_values() {
        let toml_str = r#"
store_backend = "sqlite"
embedding_model = "bge-small-en-v1.5"
embed_queue_capacity = 16
embed_retries = 0
min_similarity = 0.1
"#;
        let config: ChatConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.store_backend, StoreBackend::Sqlite);
        assert_eq!(config.embedding_model, "bge-small-en-v1.5");
        assert_eq!(config.embed_queue_capacity, 16);
        assert_eq!(config.embed_retries, 0);
        assert_eq!(config.min_similarity, Some(0.1));
        // Unspecified fields keep their defaults
        assert_eq!(config.fanout_capacity, 256);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let result: Result<ChatConfig, _> = toml::from_str(r#"store_backend = "postgres""#);
        assert!(result.is_err());
    }
}
