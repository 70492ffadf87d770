//! Task and job card storage
//!
//! The store is the single source of truth shared by the coordinator, the
//! dispatch daemon and the traceability builder. Locking is per entity key.

mod error;
mod lock_table;
mod memory;
mod traits;

pub use error::{StoreError, StoreResult};
pub use lock_table::{EntityGuard, LockTable};
pub use memory::InMemoryTaskStore;
pub use traits::TaskStore;

/// Lock key for a task entity
pub fn task_lock_key(task_key: &str) -> String {
    format!("task:{task_key}")
}

/// Lock key for a job card entity
pub fn card_lock_key(card_id: &str) -> String {
    format!("card:{card_id}")
}
