//! Per-entity lock table
//!
//! One async mutex per entity key, held outside the records themselves.
//! Different keys never contend; the same key is serialised.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Guard held while an entity is locked
pub type EntityGuard = OwnedMutexGuard<()>;

/// Sharded map of entity locks
#[derive(Debug, Default)]
pub struct LockTable {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock an entity, waiting if another holder has it
    pub async fn lock(&self, key: &str) -> EntityGuard {
        debug!(%key, "LockTable::lock: called");
        // Clone the Arc out so the shard lock is released before awaiting
        let mutex = self.locks.entry(key.to_string()).or_default().clone();
        mutex.lock_owned().await
    }

    /// Try to lock an entity without waiting
    pub fn try_lock(&self, key: &str) -> Option<EntityGuard> {
        let mutex = self.locks.entry(key.to_string()).or_default().clone();
        mutex.try_lock_owned().ok()
    }

    /// Drop one key's entry if nobody holds or waits on it
    pub fn forget(&self, key: &str) -> bool {
        let removed = self.locks.remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1).is_some();
        if removed {
            debug!(%key, "LockTable::forget: removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
