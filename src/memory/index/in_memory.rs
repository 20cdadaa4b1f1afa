use super::VectorIndex;
use crate::memory::types::{IndexEntry, ScoredId};
use crate::memory::vector::{cosine_similarity, rank_hits};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Process-local index with brute-force cosine scoring.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    entries: RwLock<HashMap<String, IndexEntry>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored entry for one memory, if indexed.
    pub fn get(&self, memory_id: &str) -> Option<IndexEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(memory_id)
            .cloned()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, entry: &IndexEntry) -> anyhow::Result<()> {
        anyhow::ensure!(!entry.embedding.is_empty(), "refusing to index an empty vector");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.memory_id.clone(), entry.clone());
        Ok(())
    }

    async fn delete(&self, memory_id: &str) -> anyhow::Result<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(memory_id);
        Ok(())
    }

    async fn query(&self, owner: &str, vector: &[f32], k: usize) -> anyhow::Result<Vec<ScoredId>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut hits: Vec<ScoredId> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|entry| entry.owner == owner)
            .map(|entry| ScoredId {
                memory_id: entry.memory_id.clone(),
                score: cosine_similarity(vector, &entry.embedding),
                updated_at: entry.updated_at,
            })
            .collect();
        rank_hits(&mut hits, k);
        Ok(hits)
    }

    async fn ids_for_owner(&self, owner: &str) -> anyhow::Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|entry| entry.owner == owner)
            .map(|entry| entry.memory_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn health_check(&self) -> bool {
        true
    }
}
