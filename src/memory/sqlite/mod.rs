mod codec;
mod repository;
mod schema;

use anyhow::Context;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::path::Path;

/// SQLite-backed metadata store.
///
/// Holds the `memories` rows plus the status history and access log tables.
/// The pool can be shared with [`crate::memory::index::SqliteVectorIndex`].
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    /// Open (or create) the database at `<workspace_dir>/memory/memoria.db`.
    pub async fn new(workspace_dir: &Path) -> anyhow::Result<Self> {
        let db_path = workspace_dir.join("memory").join("memoria.db");

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("create memory directory")?;
        }

        let url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePool::connect(&url)
            .await
            .context("open SQLite database")?;

        Self::with_pool(pool).await
    }

    /// Open an in-memory database (tests, ephemeral runs).
    pub async fn in_memory() -> anyhow::Result<Self> {
        Self::with_pool(open_in_memory_pool().await?).await
    }

    pub async fn with_pool(pool: SqlitePool) -> anyhow::Result<Self> {
        schema::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Every connection to `sqlite::memory:` is its own database, so the pool is
/// pinned to one connection that is never recycled.
pub async fn open_in_memory_pool() -> anyhow::Result<SqlitePool> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .context("open in-memory SQLite")
}
