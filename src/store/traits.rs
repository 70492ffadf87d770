//! TaskStore trait definition

use async_trait::async_trait;

use crate::domain::{JobCard, Task, TaskId, TaskStatus};

use super::error::StoreResult;
use super::lock_table::EntityGuard;

/// Shared source of truth for tasks and job cards
///
/// Implementations must lock per entity key, never with one global lock.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task; fails with `Conflict` if the key exists
    async fn create_task(&self, task: Task) -> StoreResult<TaskId>;

    async fn get_task(&self, key: &str) -> StoreResult<Option<Task>>;

    /// Replace a stored task; fails with `NotFound` if absent
    async fn update_task(&self, task: Task) -> StoreResult<()>;

    /// Claim the oldest pending task queued for a participant, marking it assigned
    async fn next_pending_for(&self, participant: &str) -> StoreResult<Option<Task>>;

    /// Return an assigned task to the pending queue
    async fn requeue(&self, key: &str) -> StoreResult<bool>;

    async fn list_tasks(&self, status: Option<TaskStatus>) -> StoreResult<Vec<Task>>;

    /// Register a card, or return the existing card with the same id untouched
    async fn register_job_card(&self, card: JobCard) -> StoreResult<JobCard>;

    async fn get_job_card(&self, card_id: &str) -> StoreResult<Option<JobCard>>;

    /// Replace a stored card; fails with `NotFound` if absent
    async fn update_job_card(&self, card: JobCard) -> StoreResult<()>;

    async fn job_cards_for_task(&self, task_key: &str) -> StoreResult<Vec<JobCard>>;

    /// Delete one card; returns false if it was absent
    async fn remove_job_card(&self, card_id: &str) -> StoreResult<bool>;

    /// Delete every card of a task, returning the removed card ids
    async fn remove_job_cards_for_task(&self, task_key: &str) -> StoreResult<Vec<String>>;

    /// Remove a task and all of its cards
    async fn retire_task(&self, key: &str) -> StoreResult<bool>;

    /// Lock one entity (task key or card id)
    async fn lock(&self, entity_key: &str) -> EntityGuard;

    /// Release bookkeeping for an entity lock nobody holds
    ///
    /// Called once the entity is gone or terminal; a later `lock` on the
    /// same key starts fresh.
    fn forget_lock(&self, entity_key: &str);
}
