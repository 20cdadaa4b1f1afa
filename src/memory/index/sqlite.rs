use super::VectorIndex;
use crate::memory::types::{IndexEntry, ScoredId, format_timestamp, parse_timestamp};
use crate::memory::vector::{bytes_to_vec, cosine_similarity, rank_hits, vec_to_bytes};
use anyhow::Context;
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Embedding BLOBs in a SQL table, scored by brute-force cosine per owner.
///
/// Shares the metadata database file but not its transactions.
pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

impl SqliteVectorIndex {
    pub async fn new(pool: SqlitePool) -> anyhow::Result<Self> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS memory_vectors (
                memory_id  TEXT PRIMARY KEY,
                owner      TEXT NOT NULL,
                embedding  BLOB NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_memory_vectors_owner ON memory_vectors(owner);",
        )
        .execute(&pool)
        .await
        .context("init memory_vectors schema")?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn upsert(&self, entry: &IndexEntry) -> anyhow::Result<()> {
        anyhow::ensure!(!entry.embedding.is_empty(), "refusing to index an empty vector");
        sqlx::query(
            "INSERT INTO memory_vectors (memory_id, owner, embedding, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(memory_id) DO UPDATE SET
                embedding = excluded.embedding,
                updated_at = excluded.updated_at",
        )
        .bind(&entry.memory_id)
        .bind(&entry.owner)
        .bind(vec_to_bytes(&entry.embedding))
        .bind(format_timestamp(&entry.updated_at))
        .execute(&self.pool)
        .await
        .context("upsert vector")?;
        Ok(())
    }

    async fn delete(&self, memory_id: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM memory_vectors WHERE memory_id = ?1")
            .bind(memory_id)
            .execute(&self.pool)
            .await
            .context("delete vector")?;
        Ok(())
    }

    async fn query(&self, owner: &str, vector: &[f32], k: usize) -> anyhow::Result<Vec<ScoredId>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let rows: Vec<(String, Vec<u8>, String)> = sqlx::query_as(
            "SELECT memory_id, embedding, updated_at FROM memory_vectors WHERE owner = ?1",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .context("scan owner vectors")?;

        let mut hits = Vec::with_capacity(rows.len());
        for (memory_id, blob, updated_at) in rows {
            let embedding = bytes_to_vec(&blob);
            hits.push(ScoredId {
                score: cosine_similarity(vector, &embedding),
                updated_at: parse_timestamp(&updated_at)
                    .with_context(|| format!("bad updated_at on vector {memory_id}"))?,
                memory_id,
            });
        }
        rank_hits(&mut hits, k);
        Ok(hits)
    }

    async fn ids_for_owner(&self, owner: &str) -> anyhow::Result<Vec<String>> {
        let ids: Vec<(String,)> = sqlx::query_as(
            "SELECT memory_id FROM memory_vectors WHERE owner = ?1 ORDER BY memory_id",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .context("list owner vector ids")?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
