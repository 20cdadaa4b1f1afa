use crate::error::MemoryError;
use crate::memory::index::VectorIndex;
use crate::memory::store::MetadataStore;
use crate::memory::types::{
    MemoryMutation, MemoryRecord, MemoryState, MemoryUpdate, MutationKind,
};
use std::sync::Arc;

/// Applies one mutation to both stores with compensating actions.
///
/// Metadata is written first and the index second, except for deletes, where
/// the vector is removed before the row is tombstoned. New rows are written
/// `Pending` and only flipped to `Active` after the vector lands. A failed
/// step undoes the earlier ones; if the undo leaves a live row without a
/// vector (or a vector without a live row) the caller gets
/// [`MemoryError::PartialApply`].
#[derive(Clone)]
pub struct DualStoreWriter {
    metadata: Arc<dyn MetadataStore>,
    index: Arc<dyn VectorIndex>,
}

impl DualStoreWriter {
    pub fn new(metadata: Arc<dyn MetadataStore>, index: Arc<dyn VectorIndex>) -> Self {
        Self { metadata, index }
    }

    pub async fn apply(&self, mutation: MemoryMutation) -> Result<MemoryRecord, MemoryError> {
        match mutation {
            MemoryMutation::Add(record) => self.add(record).await,
            MemoryMutation::Update { id, update } => self.update(&id, update).await,
            MemoryMutation::Delete { id, source } => self.delete(&id, &source).await,
        }
    }

    async fn live_snapshot(&self, id: &str) -> Result<MemoryRecord, MemoryError> {
        match self.metadata.get(id).await {
            Ok(Some(record)) if record.state.is_live() => Ok(record),
            Ok(_) => Err(MemoryError::NotFound(id.to_string())),
            Err(e) => Err(MemoryError::metadata(&e)),
        }
    }

    /// Insert `Pending`, index, then activate. Readers never see the row
    /// before its vector exists.
    async fn add(&self, mut record: MemoryRecord) -> Result<MemoryRecord, MemoryError> {
        record.state = MemoryState::Pending;
        self.metadata
            .insert(&record)
            .await
            .map_err(|e| MemoryError::metadata(&e))?;

        if let Err(cause) = self.index.upsert(&record.index_entry()).await {
            self.discard_pending(&record.id).await;
            return Err(MemoryError::vector(&cause));
        }

        match self.metadata.activate(&record.id).await {
            Ok(active) => {
                tracing::info!(memory_id = %active.id, owner = %active.owner, "memory added");
                Ok(active)
            }
            Err(cause) => match self.index.delete(&record.id).await {
                Ok(()) => {
                    self.discard_pending(&record.id).await;
                    Err(MemoryError::metadata(&cause))
                }
                Err(comp) => Err(partial_apply(&record.id, MutationKind::Add, &cause, &comp)),
            },
        }
    }

    /// Best-effort removal of an add that never went live. A row left behind
    /// stays invisible and is cleared by repair.
    async fn discard_pending(&self, id: &str) {
        if let Err(e) = self.metadata.discard(id).await {
            tracing::warn!(
                target: "memoria::consistency",
                memory_id = id,
                "pending row left for repair: {e:#}"
            );
        }
    }

    async fn update(&self, id: &str, update: MemoryUpdate) -> Result<MemoryRecord, MemoryError> {
        let snapshot = self.live_snapshot(id).await?;
        let updated = self
            .metadata
            .update(id, &update)
            .await
            .map_err(|e| MemoryError::metadata(&e))?;

        if let Err(cause) = self.index.upsert(&updated.index_entry()).await {
            return Err(match self.metadata.restore(&snapshot).await {
                Ok(()) => MemoryError::vector(&cause),
                Err(comp) => partial_apply(id, MutationKind::Update, &cause, &comp),
            });
        }

        tracing::info!(memory_id = %id, owner = %updated.owner, "memory updated");
        Ok(updated)
    }

    async fn delete(&self, id: &str, source: &str) -> Result<MemoryRecord, MemoryError> {
        let snapshot = self.live_snapshot(id).await?;
        self.index
            .delete(id)
            .await
            .map_err(|e| MemoryError::vector(&e))?;

        match self.metadata.tombstone(id, source).await {
            Ok(tombstone) => {
                tracing::info!(memory_id = %id, owner = %tombstone.owner, "memory deleted");
                Ok(tombstone)
            }
            Err(cause) => Err(match self.index.upsert(&snapshot.index_entry()).await {
                Ok(()) => MemoryError::metadata(&cause),
                Err(comp) => partial_apply(id, MutationKind::Delete, &cause, &comp),
            }),
        }
    }
}

fn partial_apply(
    memory_id: &str,
    mutation: MutationKind,
    cause: &anyhow::Error,
    compensation: &anyhow::Error,
) -> MemoryError {
    tracing::error!(
        target: "memoria::consistency",
        memory_id,
        %mutation,
        cause = %format!("{cause:#}"),
        compensation = %format!("{compensation:#}"),
        "stores diverged; compensation failed"
    );
    MemoryError::PartialApply {
        memory_id: memory_id.to_string(),
        mutation,
        cause: format!("{cause:#}"),
        compensation: format!("{compensation:#}"),
    }
}
