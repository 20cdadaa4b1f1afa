pub mod in_memory;
#[cfg(feature = "vector-search")]
pub mod lancedb;
pub mod sqlite;

use crate::memory::types::{IndexEntry, ScoredId};
use async_trait::async_trait;

pub use in_memory::InMemoryVectorIndex;
#[cfg(feature = "vector-search")]
pub use lancedb::LanceDbVectorIndex;
pub use sqlite::SqliteVectorIndex;

/// Owner-scoped nearest-neighbour store holding one vector per live memory.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Insert or replace the vector for `entry.memory_id`.
    async fn upsert(&self, entry: &IndexEntry) -> anyhow::Result<()>;

    /// Remove a vector; removing an absent id is not an error.
    async fn delete(&self, memory_id: &str) -> anyhow::Result<()>;

    /// Top `k` vectors of `owner` by cosine similarity in `[0, 1]`, ranked
    /// by [`crate::memory::vector::compare_hits`].
    async fn query(&self, owner: &str, vector: &[f32], k: usize) -> anyhow::Result<Vec<ScoredId>>;

    async fn ids_for_owner(&self, owner: &str) -> anyhow::Result<Vec<String>>;

    async fn health_check(&self) -> bool;
}
