//! Application state wiring all services together.
//!
//! AppState holds the chat service used by both CLI commands and the
//! REST/WebSocket API. The service is generic over the message store; here
//! it is pinned to a boxed store so the backend can be chosen at startup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use parley_core::chat::ChatService;
use parley_core::embedding::{BoxEmbedder, EmbeddingProvider, UnavailableEmbedder};
use parley_core::pipeline::PipelineHandle;
use parley_core::store::BoxMessageStore;
use parley_infra::config::{
    database_url, load_chat_config, model_cache_dir, resolve_data_dir, vector_store_dir,
};
use parley_infra::embedding::{FastEmbedder, parse_model};
use parley_infra::sqlite::{DatabasePool, SqliteMessageStore};
use parley_infra::vector::{LanceMessageStore, LanceVectorStore};
use parley_types::config::{ChatConfig, StoreBackend};
use parley_types::embedding::DEFAULT_EMBEDDING_DIMENSION;

pub type ConcreteChatService = ChatService<BoxMessageStore>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ConcreteChatService>,
    pub config: Arc<ChatConfig>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Resolve the data dir, load config and the embedding model, open the
    /// store, and start the embedding worker.
    ///
    /// The returned handle must be shut down before exit so queued
    /// embeddings are written.
    pub async fn init() -> anyhow::Result<(Self, PipelineHandle)> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

        let config = load_chat_config(&data_dir).await;
        let embedder = load_embedder(&config.embedding_model, &model_cache_dir(&data_dir)).await;

        Self::build(data_dir, config, embedder).await
    }

    /// Wire the service around an already-loaded embedder.
    pub async fn build(
        data_dir: PathBuf,
        config: ChatConfig,
        embedder: BoxEmbedder,
    ) -> anyhow::Result<(Self, PipelineHandle)> {
        let db_pool = DatabasePool::new(&database_url(&data_dir))
            .await
            .context("failed to open message database")?;

        let store = open_store(&config, &data_dir, &db_pool, embedder.dimension()).await?;
        let provider = Arc::new(EmbeddingProvider::from_config(embedder, &config));
        let (chat_service, handle) = ChatService::start(Arc::new(store), provider, &config);

        Ok((
            Self {
                chat_service: Arc::new(chat_service),
                config: Arc::new(config),
                data_dir,
                db_pool,
            },
            handle,
        ))
    }

    /// Name of the store backend actually in use ("lance" or "sqlite").
    pub fn backend(&self) -> &'static str {
        self.chat_service.store().backend()
    }
}

/// Load the configured fastembed model off the async runtime.
///
/// A model that cannot be loaded is replaced by an embedder that always
/// fails: messages are still stored and delivered, search reports the
/// provider as unavailable.
async fn load_embedder(model_name: &str, cache_dir: &Path) -> BoxEmbedder {
    let dimension = parse_model(model_name)
        .map(|(_, d)| d)
        .unwrap_or(DEFAULT_EMBEDDING_DIMENSION);

    let name = model_name.to_string();
    let dir = cache_dir.to_path_buf();
    let loaded = tokio::task::spawn_blocking(move || FastEmbedder::load(&name, &dir)).await;

    match loaded {
        Ok(Ok(embedder)) => BoxEmbedder::new(embedder),
        Ok(Err(e)) => {
            tracing::warn!(model = model_name, error = %e, "embedding model unavailable, search disabled");
            BoxEmbedder::new(UnavailableEmbedder::new(e.to_string(), dimension))
        }
        Err(e) => {
            tracing::warn!(model = model_name, error = %e, "embedding model loader panicked");
            BoxEmbedder::new(UnavailableEmbedder::new(e.to_string(), dimension))
        }
    }
}

/// Open the configured backend, falling back to plain SQLite if LanceDB
/// cannot be opened.
async fn open_store(
    config: &ChatConfig,
    data_dir: &Path,
    db_pool: &DatabasePool,
    dimension: usize,
) -> anyhow::Result<BoxMessageStore> {
    let rows = SqliteMessageStore::open(db_pool.clone())
        .await
        .context("failed to open message store")?;

    if config.store_backend == StoreBackend::Sqlite {
        return Ok(BoxMessageStore::new(rows, "sqlite"));
    }

    let vectors_dir = vector_store_dir(data_dir);
    let lance = match LanceVectorStore::open(&vectors_dir).await {
        Ok(vectors) => LanceMessageStore::open(rows, &vectors, dimension)
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    match lance {
        Ok(store) => Ok(BoxMessageStore::new(store, "lance")),
        Err(reason) => {
            tracing::warn!(
                path = %vectors_dir.display(),
                error = %reason,
                "vector store unavailable, falling back to sqlite backend"
            );
            let rows = SqliteMessageStore::open(db_pool.clone())
                .await
                .context("failed to open message store")?;
            Ok(BoxMessageStore::new(rows, "sqlite"))
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// State over a temp dir on the sqlite backend with no embedding model.
    pub async fn sqlite_state(dir: &Path) -> (AppState, PipelineHandle) {
        let config = ChatConfig {
            store_backend: StoreBackend::Sqlite,
            ..ChatConfig::default()
        };
        let embedder = BoxEmbedder::new(UnavailableEmbedder::new("no model in tests", 8));
        AppState::build(dir.to_path_buf(), config, embedder)
            .await
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sqlite_backend_is_used_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let (state, handle) = test_support::sqlite_state(dir.path()).await;
        assert_eq!(state.backend(), "sqlite");
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn lance_backend_opens_under_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = BoxEmbedder::new(UnavailableEmbedder::new("no model in tests", 8));
        let (state, handle) = AppState::build(dir.path().to_path_buf(), ChatConfig::default(), embedder)
            .await
            .unwrap();
        assert_eq!(state.backend(), "lance");
        assert!(vector_store_dir(dir.path()).exists());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn lance_width_conflict_falls_back_to_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let first = BoxEmbedder::new(UnavailableEmbedder::new("no model", 8));
        let (_, handle) = AppState::build(dir.path().to_path_buf(), ChatConfig::default(), first)
            .await
            .unwrap();
        handle.shutdown().await;

        let wider = BoxEmbedder::new(UnavailableEmbedder::new("no model", 16));
        let (state, handle) = AppState::build(dir.path().to_path_buf(), ChatConfig::default(), wider)
            .await
            .unwrap();
        assert_eq!(state.backend(), "sqlite");
        handle.shutdown().await;
    }
}
