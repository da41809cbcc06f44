//! LanceDB connection wrapper.
//!
//! `LanceVectorStore` owns a `lancedb::Connection` rooted at a directory and
//! offers the table lifecycle helpers the message vector store needs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_schema::Schema;

pub struct LanceVectorStore {
    db: lancedb::Connection,
    base_path: PathBuf,
}

impl LanceVectorStore {
    /// Open or create a LanceDB database at `base_path`.
    ///
    /// Creates the directory if it does not exist.
    pub async fn open(base_path: &Path) -> Result<Self, lancedb::Error> {
        std::fs::create_dir_all(base_path).map_err(|e| lancedb::Error::CreateDir {
            path: base_path.display().to_string(),
            source: e,
        })?;

        let uri = base_path.to_str().ok_or_else(|| lancedb::Error::InvalidInput {
            message: format!("Path contains invalid UTF-8: {}", base_path.display()),
        })?;

        let db = lancedb::connect(uri).execute().await?;
        tracing::debug!(path = %base_path.display(), "opened LanceDB");

        Ok(Self {
            db,
            base_path: base_path.to_path_buf(),
        })
    }

    /// Open `table_name`, creating it empty with `schema` if it is missing.
    pub async fn ensure_table(
        &self,
        table_name: &str,
        schema: Arc<Schema>,
    ) -> Result<lancedb::Table, lancedb::Error> {
        match self.db.open_table(table_name).execute().await {
            Ok(table) => Ok(table),
            Err(lancedb::Error::TableNotFound { .. }) => {
                tracing::info!(table = table_name, "creating LanceDB table");
                self.db.create_empty_table(table_name, schema).execute().await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn table_names(&self) -> Result<Vec<String>, lancedb::Error> {
        self.db.table_names().execute().await
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}
