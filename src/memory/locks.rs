use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

type OwnerLock = Arc<tokio::sync::Mutex<()>>;

/// Per-owner mutual exclusion for the lookup, decide and apply step.
///
/// Entries that no task holds or waits on are pruned on every acquisition, so
/// the table stays bounded by the number of owners currently in flight.
#[derive(Default)]
pub struct OwnerLocks {
    locks: Mutex<BTreeMap<String, OwnerLock>>,
}

impl OwnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, owner: &str) -> OwnerLock {
        let mut guard = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        guard.retain(|key, lock| key == owner || Arc::strong_count(lock) > 1);
        guard
            .entry(owner.to_owned())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    pub async fn acquire(&self, owner: &str) -> OwnedMutexGuard<()> {
        self.lock_for(owner).lock_owned().await
    }

    /// Number of owners with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
