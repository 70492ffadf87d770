//! Appends journey elements to stored tasks under the task lock

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::TaskId;
use crate::store::{StoreError, TaskStore, task_lock_key};

use super::chain::{TraceabilityChain, TraceabilityElement};

/// Serializes chain updates per task through the store's lock table
pub struct TraceabilityBuilder {
    store: Arc<dyn TaskStore>,
}

impl TraceabilityBuilder {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Append an element to the chain of the task identified by `task_id`
    ///
    /// Returns the updated chain, or `None` if the task no longer exists.
    /// An element whose task id is already recorded leaves the chain as is.
    pub async fn append_task_journey(
        &self,
        task_id: &TaskId,
        element: TraceabilityElement,
    ) -> Result<Option<TraceabilityChain>, StoreError> {
        debug!(%task_id, element_task = %element.task_id, "TraceabilityBuilder::append_task_journey: called");
        let lock_key = task_lock_key(task_id.as_str());
        let guard = self.store.lock(&lock_key).await;

        let Some(mut task) = self.store.get_task(task_id.as_str()).await? else {
            warn!(%task_id, "append_task_journey: task not found");
            drop(guard);
            self.store.forget_lock(&lock_key);
            return Ok(None);
        };

        let terminal = task.is_terminal();
        let chain = if task.traceability.append_task_journey(element) {
            task.touch();
            let chain = task.traceability.clone();
            self.store.update_task(task).await?;
            chain
        } else {
            task.traceability
        };

        // Nothing else locks a concluded task
        drop(guard);
        if terminal {
            self.store.forget_lock(&lock_key);
        }
        Ok(Some(chain))
    }

    /// Current chain for a task
    pub async fn chain_for(&self, task_id: &TaskId) -> Result<Option<TraceabilityChain>, StoreError> {
        Ok(self
            .store
            .get_task(task_id.as_str())
            .await?
            .map(|t| t.traceability))
    }
}
