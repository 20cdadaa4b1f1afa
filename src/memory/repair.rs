use crate::error::MemoryError;
use crate::memory::index::VectorIndex;
use crate::memory::store::MetadataStore;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Difference between the live metadata ids and the indexed ids of one owner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub owner: String,
    pub live: usize,
    pub indexed: usize,
    /// Live rows without a vector.
    pub missing_vectors: Vec<String>,
    /// Vectors without a live row.
    pub orphaned_vectors: Vec<String>,
    /// Rows stuck in `Pending` by an interrupted add. Invisible to readers,
    /// so they do not make the stores inconsistent.
    pub stale_pending: Vec<String>,
}

impl ConsistencyReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.missing_vectors.is_empty() && self.orphaned_vectors.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub owner: String,
    pub reindexed: Vec<String>,
    pub removed: Vec<String>,
    /// Live rows that could not be reindexed because no embedding was stored.
    pub skipped: Vec<String>,
    /// Stale `Pending` rows removed.
    pub discarded: Vec<String>,
}

#[derive(Clone)]
pub struct ConsistencyChecker {
    metadata: Arc<dyn MetadataStore>,
    index: Arc<dyn VectorIndex>,
}

impl ConsistencyChecker {
    pub fn new(metadata: Arc<dyn MetadataStore>, index: Arc<dyn VectorIndex>) -> Self {
        Self { metadata, index }
    }

    pub async fn check(&self, owner: &str) -> Result<ConsistencyReport, MemoryError> {
        let live: BTreeSet<String> = self
            .metadata
            .list_active(owner)
            .await
            .map_err(|e| MemoryError::metadata(&e))?
            .into_iter()
            .map(|r| r.id)
            .collect();
        let indexed: BTreeSet<String> = self
            .index
            .ids_for_owner(owner)
            .await
            .map_err(|e| MemoryError::vector(&e))?
            .into_iter()
            .collect();
        let stale_pending: Vec<String> = self
            .metadata
            .pending(owner)
            .await
            .map_err(|e| MemoryError::metadata(&e))?
            .into_iter()
            .map(|r| r.id)
            .collect();

        let report = ConsistencyReport {
            owner: owner.to_string(),
            live: live.len(),
            indexed: indexed.len(),
            missing_vectors: live.difference(&indexed).cloned().collect(),
            orphaned_vectors: indexed.difference(&live).cloned().collect(),
            stale_pending,
        };
        if !report.is_consistent() {
            tracing::warn!(
                target: "memoria::consistency",
                owner,
                missing = report.missing_vectors.len(),
                orphaned = report.orphaned_vectors.len(),
                "stores disagree on live memories"
            );
        }
        Ok(report)
    }

    /// Re-upsert missing vectors from stored embeddings, drop orphans, then
    /// discard stale pending rows. Callers hold the owner lock, so no add is
    /// in flight.
    pub async fn repair(&self, owner: &str) -> Result<RepairReport, MemoryError> {
        let report = self.check(owner).await?;
        let mut repaired = RepairReport {
            owner: owner.to_string(),
            ..RepairReport::default()
        };

        for id in report.missing_vectors {
            let row = self
                .metadata
                .get(&id)
                .await
                .map_err(|e| MemoryError::metadata(&e))?;
            match row {
                Some(record) if !record.embedding.is_empty() => {
                    self.index
                        .upsert(&record.index_entry())
                        .await
                        .map_err(|e| MemoryError::vector(&e))?;
                    repaired.reindexed.push(id);
                }
                _ => repaired.skipped.push(id),
            }
        }

        for id in report.orphaned_vectors {
            self.index
                .delete(&id)
                .await
                .map_err(|e| MemoryError::vector(&e))?;
            repaired.removed.push(id);
        }

        for id in report.stale_pending {
            self.metadata
                .discard(&id)
                .await
                .map_err(|e| MemoryError::metadata(&e))?;
            repaired.discarded.push(id);
        }

        tracing::info!(
            target: "memoria::consistency",
            owner,
            reindexed = repaired.reindexed.len(),
            removed = repaired.removed.len(),
            skipped = repaired.skipped.len(),
            discarded = repaired.discarded.len(),
            "repair finished"
        );
        Ok(repaired)
    }
}
