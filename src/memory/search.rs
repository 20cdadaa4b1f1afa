use crate::error::MemoryError;
use crate::memory::index::VectorIndex;
use crate::memory::store::MetadataStore;
use crate::memory::types::{MemoryState, ScoredMemory};
use std::sync::Arc;

/// Joins vector-index hits with their metadata rows.
#[derive(Clone)]
pub struct SimilaritySearch {
    metadata: Arc<dyn MetadataStore>,
    index: Arc<dyn VectorIndex>,
}

impl SimilaritySearch {
    pub fn new(metadata: Arc<dyn MetadataStore>, index: Arc<dyn VectorIndex>) -> Self {
        Self { metadata, index }
    }

    /// Up to `k` live memories of `owner`, most similar first.
    ///
    /// Hits whose row is missing, tombstoned or owned by someone else are
    /// index drift: they are logged and skipped, never returned. Hits on a
    /// `Pending` row belong to an add that has not finished and are skipped.
    pub async fn nearest_neighbors(
        &self,
        owner: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredMemory>, MemoryError> {
        let hits = self
            .index
            .query(owner, vector, k)
            .await
            .map_err(|e| MemoryError::vector(&e))?;

        let mut joined = Vec::with_capacity(hits.len());
        for hit in hits {
            let row = self
                .metadata
                .get(&hit.memory_id)
                .await
                .map_err(|e| MemoryError::metadata(&e))?;
            match row {
                Some(memory) if memory.state.is_live() && memory.owner == owner => {
                    joined.push(ScoredMemory {
                        memory,
                        score: hit.score,
                    });
                }
                Some(memory) if memory.state == MemoryState::Pending => {
                    tracing::debug!(memory_id = %hit.memory_id, owner, "skipping add in flight");
                }
                other => {
                    tracing::warn!(
                        memory_id = %hit.memory_id,
                        owner,
                        state = ?other.as_ref().map(|m| m.state),
                        "index drift: hit has no live metadata row"
                    );
                }
            }
        }
        Ok(joined)
    }
}
