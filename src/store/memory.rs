//! In-memory TaskStore backed by DashMap
//!
//! Stands in for the external shared store within one process and in
//! tests. Several coordinators holding the same `Arc<InMemoryTaskStore>`
//! behave like separate processes sharing one store.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::domain::{JobCard, Task, TaskId, TaskStatus};

use super::error::{StoreError, StoreResult};
use super::lock_table::{EntityGuard, LockTable};
use super::traits::TaskStore;
use super::{card_lock_key, task_lock_key};

/// Thread-safe in-memory store
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: DashMap<String, Task>,
    cards: DashMap<String, JobCard>,
    locks: LockTable,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tasks
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Number of stored job cards
    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    /// Number of entity lock entries
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task(&self, task: Task) -> StoreResult<TaskId> {
        debug!(task_id = %task.id, queued_for = %task.queued_for, "create_task: called");
        let id = task.id.clone();
        match self.tasks.entry(task.key().to_string()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(task);
                Ok(id)
            }
        }
    }

    async fn get_task(&self, key: &str) -> StoreResult<Option<Task>> {
        debug!(%key, "get_task: called");
        Ok(self.tasks.get(key).map(|t| t.value().clone()))
    }

    async fn update_task(&self, task: Task) -> StoreResult<()> {
        debug!(task_id = %task.id, status = %task.status, "update_task: called");
        match self.tasks.get_mut(task.key()) {
            Some(mut slot) => {
                *slot = task;
                Ok(())
            }
            None => Err(StoreError::NotFound(task.id.to_string())),
        }
    }

    async fn next_pending_for(&self, participant: &str) -> StoreResult<Option<Task>> {
        debug!(%participant, "next_pending_for: called");
        // Collect first; holding iterator refs while taking get_mut would deadlock a shard
        let mut candidates: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending && t.queued_for == participant)
            .map(|t| t.id.clone())
            .collect();
        candidates.sort();

        for id in candidates {
            if let Some(mut task) = self.tasks.get_mut(id.as_str())
                && task.status == TaskStatus::Pending
            {
                task.set_status(TaskStatus::Assigned);
                debug!(task_id = %id, %participant, "next_pending_for: claimed");
                return Ok(Some(task.clone()));
            }
        }
        Ok(None)
    }

    async fn requeue(&self, key: &str) -> StoreResult<bool> {
        debug!(%key, "requeue: called");
        match self.tasks.get_mut(key) {
            Some(mut task) if task.status == TaskStatus::Assigned => {
                task.set_status(TaskStatus::Pending);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn list_tasks(&self, status: Option<TaskStatus>) -> StoreResult<Vec<Task>> {
        debug!(?status, "list_tasks: called");
        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| status.is_none_or(|s| t.status == s))
            .map(|t| t.value().clone())
            .collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tasks)
    }

    async fn register_job_card(&self, card: JobCard) -> StoreResult<JobCard> {
        debug!(card_id = %card.id, "register_job_card: called");
        let stored = self.cards.entry(card.id.clone()).or_insert(card);
        Ok(stored.value().clone())
    }

    async fn get_job_card(&self, card_id: &str) -> StoreResult<Option<JobCard>> {
        Ok(self.cards.get(card_id).map(|c| c.value().clone()))
    }

    async fn update_job_card(&self, card: JobCard) -> StoreResult<()> {
        debug!(card_id = %card.id, status = %card.status, "update_job_card: called");
        match self.cards.get_mut(&card.id) {
            Some(mut slot) => {
                *slot = card;
                Ok(())
            }
            None => Err(StoreError::NotFound(card.id)),
        }
    }

    async fn job_cards_for_task(&self, task_key: &str) -> StoreResult<Vec<JobCard>> {
        Ok(self
            .cards
            .iter()
            .filter(|c| c.task_id.as_str() == task_key)
            .map(|c| c.value().clone())
            .collect())
    }

    async fn remove_job_card(&self, card_id: &str) -> StoreResult<bool> {
        debug!(%card_id, "remove_job_card: called");
        Ok(self.cards.remove(card_id).is_some())
    }

    async fn remove_job_cards_for_task(&self, task_key: &str) -> StoreResult<Vec<String>> {
        debug!(%task_key, "remove_job_cards_for_task: called");
        let mut removed = Vec::new();
        self.cards.retain(|id, c| {
            let keep = c.task_id.as_str() != task_key;
            if !keep {
                removed.push(id.clone());
            }
            keep
        });
        Ok(removed)
    }

    async fn retire_task(&self, key: &str) -> StoreResult<bool> {
        debug!(%key, "retire_task: called");
        let removed = self.tasks.remove(key).is_some();
        for card_id in self.remove_job_cards_for_task(key).await? {
            self.locks.forget(&card_lock_key(&card_id));
        }
        self.locks.forget(&task_lock_key(key));
        Ok(removed)
    }

    async fn lock(&self, entity_key: &str) -> EntityGuard {
        self.locks.lock(entity_key).await
    }

    fn forget_lock(&self, entity_key: &str) {
        self.locks.forget(entity_key);
    }
}
