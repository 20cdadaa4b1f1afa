use crate::memory::types::{AccessKind, MemoryRecord, MemoryUpdate, StatusChange};
use async_trait::async_trait;

/// Authoritative per-memory record store.
///
/// Every state transition is appended to the status history in the same
/// write as the row it describes.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    fn name(&self) -> &str;

    /// Insert a fresh row in `record.state`. New memories arrive `Pending`
    /// and stay invisible until [`MetadataStore::activate`].
    async fn insert(&self, record: &MemoryRecord) -> anyhow::Result<()>;

    /// Flip a `Pending` row to `Active` once its vector is indexed.
    async fn activate(&self, id: &str) -> anyhow::Result<MemoryRecord>;

    /// `Pending` rows of one owner; left behind only by an interrupted add.
    async fn pending(&self, owner: &str) -> anyhow::Result<Vec<MemoryRecord>>;

    /// Replace text, embedding and provenance of a live row; state becomes
    /// `Updated`.
    async fn update(&self, id: &str, update: &MemoryUpdate) -> anyhow::Result<MemoryRecord>;

    /// Mark a live row `Deleted`, keeping it as a tombstone.
    async fn tombstone(&self, id: &str, source: &str) -> anyhow::Result<MemoryRecord>;

    /// Fetch a row in any state, with its categories.
    async fn get(&self, id: &str) -> anyhow::Result<Option<MemoryRecord>>;

    /// Live rows of one owner, newest first.
    async fn list_active(&self, owner: &str) -> anyhow::Result<Vec<MemoryRecord>>;

    /// Physically remove a row that never became visible, with its history
    /// and tags.
    async fn discard(&self, id: &str) -> anyhow::Result<()>;

    /// Put a previously snapshotted row back as it was.
    async fn restore(&self, snapshot: &MemoryRecord) -> anyhow::Result<()>;

    /// Tag a row with categories; existing tags are kept.
    async fn add_categories(&self, id: &str, categories: &[String]) -> anyhow::Result<()>;

    /// Owners with at least one committed (non-pending) row.
    async fn owners(&self) -> anyhow::Result<Vec<String>>;

    async fn record_access(
        &self,
        owner: &str,
        memory_ids: &[String],
        kind: AccessKind,
    ) -> anyhow::Result<()>;

    async fn status_history(&self, id: &str) -> anyhow::Result<Vec<StatusChange>>;

    async fn health_check(&self) -> bool;
}
