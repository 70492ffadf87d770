//! ExecutionCoordinator implementation

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::{GrantedStatus, JobCard, Task, TaskId, TaskStatus, now_ms};
use crate::interfaces::ProcessIdentity;
use crate::store::{TaskStore, card_lock_key, task_lock_key};

use super::config::CoordinatorConfig;
use super::messages::{CoordinatorError, CoordinatorMetrics, MetricCounters};

/// Decides which process may execute a task
///
/// Every process runs its own coordinator against the same shared store.
/// Attempts on one task are serialized by the task's entity lock, taken
/// after the card's lock.
pub struct ExecutionCoordinator {
    config: CoordinatorConfig,
    store: Arc<dyn TaskStore>,
    identity: Arc<dyn ProcessIdentity>,
    counters: MetricCounters,
}

impl ExecutionCoordinator {
    pub fn new(config: CoordinatorConfig, store: Arc<dyn TaskStore>, identity: Arc<dyn ProcessIdentity>) -> Self {
        debug!(convergence_wait_ms = %config.convergence_wait_ms, "ExecutionCoordinator::new: called");
        Self {
            config,
            store,
            identity,
            counters: MetricCounters::default(),
        }
    }

    /// This process's identity
    pub fn process_id(&self) -> String {
        self.identity.process_id()
    }

    /// Build a waiting card for a task owned by this process
    pub fn job_card_for(&self, task_id: &TaskId) -> JobCard {
        JobCard::new(task_id.clone(), self.identity.process_id())
    }

    pub fn metrics(&self) -> CoordinatorMetrics {
        self.counters.snapshot()
    }

    /// Ask for the right to execute a card's task
    ///
    /// Returns the card with status `Executing` on grant. Any other status
    /// means the request was denied; denial is not an error.
    pub async fn request_execution_privilege(&self, card: JobCard) -> Result<JobCard, CoordinatorError> {
        debug!(card_id = %card.id, process_id = %card.process_id, "request_execution_privilege: called");
        validate(&card)?;

        if card.is_terminal() {
            debug!(card_id = %card.id, status = %card.status, "request_execution_privilege: card is terminal");
            return Ok(self.deny(card));
        }

        let card_key = card_lock_key(&card.id);
        let task_key = task_lock_key(card.task_id.as_str());
        let card_guard = self.store.lock(&card_key).await;
        let task_guard = self.store.lock(&task_key).await;

        let decision = self.decide(card).await;

        drop(task_guard);
        drop(card_guard);
        let (card, settled) = decision?;
        if settled {
            self.store.forget_lock(&task_key);
            self.store.forget_lock(&card_key);
        }
        Ok(card)
    }

    /// Privilege decision under both locks; `true` means the task is gone or terminal
    async fn decide(&self, card: JobCard) -> Result<(JobCard, bool), CoordinatorError> {
        let Some(mut task) = self.store.get_task(card.task_id.as_str()).await? else {
            debug!(task_id = %card.task_id, "request_execution_privilege: task not found");
            return Ok((self.deny(card), true));
        };
        if task.is_terminal() {
            debug!(task_id = %task.id, status = %task.status, "request_execution_privilege: task is terminal");
            return Ok((self.deny(card), true));
        }

        let siblings = self.store.job_cards_for_task(card.task_id.as_str()).await?;
        if let Some(holder) = siblings.iter().find(|c| c.id != card.id && c.is_executing()) {
            debug!(card_id = %card.id, holder = %holder.id, "request_execution_privilege: task held by another card");
            return Ok((self.deny(card), false));
        }

        let mut shared = self.store.register_job_card(card).await?;
        if shared.is_executing() {
            debug!(card_id = %shared.id, "request_execution_privilege: already granted");
            return Ok((shared, false));
        }

        if self.may_execute(&task, &shared) {
            shared.set_status(GrantedStatus::Executing);
            task.set_status(TaskStatus::Executing);
            self.store.update_task(task).await?;
            self.store.update_job_card(shared.clone()).await?;
            MetricCounters::bump(&self.counters.granted);
            info!(card_id = %shared.id, process_id = %shared.process_id, "Execution privilege granted");
        } else {
            shared.touch();
            self.store.update_job_card(shared.clone()).await?;
            MetricCounters::bump(&self.counters.denied);
            debug!(card_id = %shared.id, "request_execution_privilege: not yet, still waiting");
        }
        Ok((shared, false))
    }

    /// Record that a granted card has started running
    pub async fn report_task_execution_start(&self, card: JobCard) -> Result<JobCard, CoordinatorError> {
        debug!(card_id = %card.id, "report_task_execution_start: called");
        validate(&card)?;

        let _card_guard = self.store.lock(&card_lock_key(&card.id)).await;
        let _task_guard = self.store.lock(&task_lock_key(card.task_id.as_str())).await;

        let Some(mut shared) = self.store.get_job_card(&card.id).await? else {
            warn!(card_id = %card.id, "report_task_execution_start: unknown card");
            return Ok(card);
        };
        if !shared.is_executing() {
            debug!(card_id = %shared.id, status = %shared.status, "report_task_execution_start: not executing, ignored");
            return Ok(shared);
        }
        if shared.started_at.is_none() {
            shared.started_at = Some(now_ms());
            shared.touch();
            self.store.update_job_card(shared.clone()).await?;
        }
        Ok(shared)
    }

    /// Mark an executing card finished
    pub async fn report_task_execution_finish(
        &self,
        card: JobCard,
        summary: impl Into<String>,
    ) -> Result<JobCard, CoordinatorError> {
        debug!(card_id = %card.id, "report_task_execution_finish: called");
        self.conclude(card, GrantedStatus::Finished, Some(summary.into())).await
    }

    /// Mark an executing card failed
    pub async fn report_task_execution_failure(
        &self,
        card: JobCard,
        reason: impl Into<String>,
    ) -> Result<JobCard, CoordinatorError> {
        debug!(card_id = %card.id, "report_task_execution_failure: called");
        self.conclude(card, GrantedStatus::Failed, Some(reason.into())).await
    }

    /// Cancel a waiting or executing card
    ///
    /// Cancelling an executing card cancels the task. A waiting card only
    /// withdraws its claim; the task stays open to other processes.
    pub async fn report_task_cancellation(&self, card: JobCard) -> Result<JobCard, CoordinatorError> {
        debug!(card_id = %card.id, "report_task_cancellation: called");
        self.conclude(card, GrantedStatus::Cancelled, None).await
    }

    /// Cancel a task and drop every card on it
    ///
    /// Later privilege requests for the task are denied. Returns false if
    /// the task is unknown or already terminal.
    pub async fn cancel_task(&self, task_key: &str) -> Result<bool, CoordinatorError> {
        debug!(%task_key, "cancel_task: called");
        if task_key.is_empty() {
            return Err(CoordinatorError::InvalidCard("empty task key".to_string()));
        }

        let lock_key = task_lock_key(task_key);
        let task_guard = self.store.lock(&lock_key).await;

        let Some(mut task) = self.store.get_task(task_key).await? else {
            return Ok(false);
        };
        if task.is_terminal() {
            return Ok(false);
        }

        task.set_status(TaskStatus::Cancelled);
        self.store.update_task(task).await?;
        let removed = self.store.remove_job_cards_for_task(task_key).await?;

        drop(task_guard);
        self.forget_locks(&lock_key, &removed);
        MetricCounters::bump(&self.counters.cancelled);
        info!(%task_key, cards = removed.len(), "Task cancelled");
        Ok(true)
    }

    fn may_execute(&self, task: &Task, card: &JobCard) -> bool {
        match &task.node_affinity {
            Some(target) => {
                let granted = *target == card.process_id;
                debug!(%target, process_id = %card.process_id, %granted, "may_execute: affinity check");
                granted
            }
            None => {
                let age = card.age_ms(now_ms());
                let granted = age >= self.config.convergence_wait_ms as i64;
                debug!(%age, wait = %self.config.convergence_wait_ms, %granted, "may_execute: convergence check");
                granted
            }
        }
    }

    fn deny(&self, card: JobCard) -> JobCard {
        MetricCounters::bump(&self.counters.denied);
        card
    }

    fn forget_locks(&self, task_lock: &str, card_ids: &[String]) {
        self.store.forget_lock(task_lock);
        for card_id in card_ids {
            self.store.forget_lock(&card_lock_key(card_id));
        }
    }

    async fn conclude(
        &self,
        card: JobCard,
        target: GrantedStatus,
        note: Option<String>,
    ) -> Result<JobCard, CoordinatorError> {
        validate(&card)?;

        let task_key = task_lock_key(card.task_id.as_str());
        let card_guard = self.store.lock(&card_lock_key(&card.id)).await;
        let task_guard = self.store.lock(&task_key).await;

        let outcome = self.conclude_locked(card, target, note).await;

        drop(task_guard);
        drop(card_guard);
        let (card, removed) = outcome?;
        if !removed.is_empty() {
            self.forget_locks(&task_key, &removed);
        }
        Ok(card)
    }

    /// Transition under both locks; returns the card and the ids of cards deleted
    async fn conclude_locked(
        &self,
        card: JobCard,
        target: GrantedStatus,
        note: Option<String>,
    ) -> Result<(JobCard, Vec<String>), CoordinatorError> {
        let Some(mut shared) = self.store.get_job_card(&card.id).await? else {
            return self.concluded_elsewhere(card, target).await.map(|c| (c, Vec::new()));
        };

        let allowed = match target {
            GrantedStatus::Cancelled => true,
            GrantedStatus::Finished | GrantedStatus::Failed => shared.is_executing(),
            GrantedStatus::Waiting | GrantedStatus::Executing => false,
        };
        if !allowed {
            warn!(card_id = %shared.id, from = %shared.status, to = %target, "conclude: transition ignored");
            return Ok((shared, Vec::new()));
        }

        let was_executing = shared.is_executing();
        shared.set_status(target);
        shared.note = note;

        let removed = if target == GrantedStatus::Cancelled && !was_executing {
            // Withdrawn claim: only this card goes, the task stays open
            self.store.remove_job_card(&shared.id).await?;
            vec![shared.id.clone()]
        } else {
            if let Some(mut task) = self.store.get_task(shared.task_id.as_str()).await? {
                task.set_status(task_status_for(target));
                self.store.update_task(task).await?;
            }
            self.store.remove_job_cards_for_task(shared.task_id.as_str()).await?
        };

        match target {
            GrantedStatus::Finished => MetricCounters::bump(&self.counters.finished),
            GrantedStatus::Failed => MetricCounters::bump(&self.counters.failed),
            GrantedStatus::Cancelled => MetricCounters::bump(&self.counters.cancelled),
            _ => {}
        }
        info!(card_id = %shared.id, status = %shared.status, "Job card concluded");
        Ok((shared, removed))
    }

    /// A card with no stored record was either concluded already or never registered
    async fn concluded_elsewhere(&self, mut card: JobCard, target: GrantedStatus) -> Result<JobCard, CoordinatorError> {
        let status = self
            .store
            .get_task(card.task_id.as_str())
            .await?
            .and_then(|task| granted_status_for(task.status));
        match status {
            Some(status) => {
                debug!(card_id = %card.id, %status, "conclude: already concluded");
                card.status = status;
            }
            None => warn!(card_id = %card.id, %target, "conclude: unknown card"),
        }
        Ok(card)
    }
}

fn validate(card: &JobCard) -> Result<(), CoordinatorError> {
    if card.task_id.as_str().is_empty() {
        return Err(CoordinatorError::InvalidCard("empty task key".to_string()));
    }
    if card.process_id.is_empty() {
        return Err(CoordinatorError::InvalidCard(format!(
            "card {} has no process id",
            card.id
        )));
    }
    Ok(())
}

/// Card status implied by a terminal task
fn granted_status_for(status: TaskStatus) -> Option<GrantedStatus> {
    match status {
        TaskStatus::Finished => Some(GrantedStatus::Finished),
        TaskStatus::Failed => Some(GrantedStatus::Failed),
        TaskStatus::Cancelled => Some(GrantedStatus::Cancelled),
        TaskStatus::Pending | TaskStatus::Assigned | TaskStatus::Executing => None,
    }
}

fn task_status_for(status: GrantedStatus) -> TaskStatus {
    match status {
        GrantedStatus::Waiting => TaskStatus::Pending,
        GrantedStatus::Executing => TaskStatus::Executing,
        GrantedStatus::Finished => TaskStatus::Finished,
        GrantedStatus::Failed => TaskStatus::Failed,
        GrantedStatus::Cancelled => TaskStatus::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DataParcelManifest, ParcelDirection, PayloadRef};
    use crate::interfaces::StaticIdentity;
    use crate::store::InMemoryTaskStore;
    use std::time::Duration;

    fn payload() -> PayloadRef {
        PayloadRef::new("payload-1", DataParcelManifest::new("patient", "admit", ParcelDirection::Inbound))
    }

    async fn seed(store: &InMemoryTaskStore, key: &str, affinity: Option<&str>) -> TaskId {
        let mut task = Task::new(TaskId::new(1, 1, key), "worker", payload());
        if let Some(target) = affinity {
            task = task.with_affinity(target);
        }
        store.create_task(task).await.unwrap()
    }

    fn coordinator(store: Arc<InMemoryTaskStore>, process: &str, wait_ms: u64) -> ExecutionCoordinator {
        ExecutionCoordinator::new(
            CoordinatorConfig::with_convergence_wait(Duration::from_millis(wait_ms)),
            store,
            Arc::new(StaticIdentity::new(process)),
        )
    }

    #[tokio::test]
    async fn test_affinity_grants_matching_process_immediately() {
        let store = Arc::new(InMemoryTaskStore::new());
        let id = seed(&store, "t1", Some("node-a")).await;
        let coord = coordinator(store.clone(), "node-a", 60_000);

        let card = coord.request_execution_privilege(coord.job_card_for(&id)).await.unwrap();
        assert_eq!(card.status, GrantedStatus::Executing);

        let task = store.get_task("t1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Executing);
        assert_eq!(coord.metrics().granted, 1);
    }

    #[tokio::test]
    async fn test_affinity_denies_other_process() {
        let store = Arc::new(InMemoryTaskStore::new());
        let id = seed(&store, "t1", Some("node-a")).await;
        let coord = coordinator(store.clone(), "node-b", 0);

        let card = coord.request_execution_privilege(coord.job_card_for(&id)).await.unwrap();
        assert_eq!(card.status, GrantedStatus::Waiting);
        assert_eq!(store.get_task("t1").await.unwrap().unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_convergence_wait_blocks_then_grants() {
        let store = Arc::new(InMemoryTaskStore::new());
        let id = seed(&store, "t1", None).await;
        let coord = coordinator(store.clone(), "node-a", 50);

        let first = coord.request_execution_privilege(coord.job_card_for(&id)).await.unwrap();
        assert_eq!(first.status, GrantedStatus::Waiting);

        tokio::time::sleep(Duration::from_millis(80)).await;

        // A fresh card object still measures from the first registration
        let second = coord.request_execution_privilege(coord.job_card_for(&id)).await.unwrap();
        assert_eq!(second.status, GrantedStatus::Executing);
        assert_eq!(second.registered_at, first.registered_at);
    }

    #[tokio::test]
    async fn test_missing_task_is_silent_denial() {
        let store = Arc::new(InMemoryTaskStore::new());
        let coord = coordinator(store, "node-a", 0);
        let card = coord.job_card_for(&TaskId::new(1, 1, "ghost"));

        let result = coord.request_execution_privilege(card.clone()).await.unwrap();
        assert_eq!(result, card);
        assert_eq!(coord.metrics().denied, 1);
    }

    #[tokio::test]
    async fn test_empty_process_id_is_error() {
        let store = Arc::new(InMemoryTaskStore::new());
        let coord = coordinator(store, "node-a", 0);
        let card = JobCard::new(TaskId::new(1, 1, "t1"), "");

        let err = coord.request_execution_privilege(card).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::InvalidCard(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_at_most_one_executing_under_contention() {
        let store = Arc::new(InMemoryTaskStore::new());
        let id = seed(&store, "hot", None).await;

        let coords: Vec<ExecutionCoordinator> = (0..8)
            .map(|i| coordinator(store.clone(), &format!("node-{i}"), 0))
            .collect();

        let results = futures::future::join_all(
            coords
                .iter()
                .map(|c| c.request_execution_privilege(c.job_card_for(&id))),
        )
        .await;

        let granted = results
            .into_iter()
            .map(|r| r.unwrap())
            .filter(|c| c.is_executing())
            .count();
        assert_eq!(granted, 1);

        let executing = store
            .job_cards_for_task("hot")
            .await
            .unwrap()
            .into_iter()
            .filter(|c| c.is_executing())
            .count();
        assert_eq!(executing, 1);
    }

    #[tokio::test]
    async fn test_finish_is_idempotent() {
        let store = Arc::new(InMemoryTaskStore::new());
        let id = seed(&store, "t1", Some("node-a")).await;
        let coord = coordinator(store.clone(), "node-a", 0);

        let card = coord.request_execution_privilege(coord.job_card_for(&id)).await.unwrap();
        let card = coord.report_task_execution_start(card).await.unwrap();
        assert!(card.started_at.is_some());

        let done = coord.report_task_execution_finish(card.clone(), "ok").await.unwrap();
        assert_eq!(done.status, GrantedStatus::Finished);
        assert_eq!(done.note.as_deref(), Some("ok"));

        let again = coord.report_task_execution_finish(card, "ok again").await.unwrap();
        assert_eq!(again.status, GrantedStatus::Finished);
        assert_eq!(coord.metrics().finished, 1);

        assert_eq!(store.get_task("t1").await.unwrap().unwrap().status, TaskStatus::Finished);
    }

    #[tokio::test]
    async fn test_finish_requires_grant() {
        let store = Arc::new(InMemoryTaskStore::new());
        let id = seed(&store, "t1", Some("node-a")).await;
        let coord = coordinator(store.clone(), "node-b", 0);

        let card = coord.request_execution_privilege(coord.job_card_for(&id)).await.unwrap();
        let result = coord.report_task_execution_finish(card, "sneaky").await.unwrap();
        assert_eq!(result.status, GrantedStatus::Waiting);
        assert_eq!(store.get_task("t1").await.unwrap().unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_failure_denies_later_requests() {
        let store = Arc::new(InMemoryTaskStore::new());
        let id = seed(&store, "t1", None).await;
        let a = coordinator(store.clone(), "node-a", 0);
        let b = coordinator(store.clone(), "node-b", 0);

        let card = a.request_execution_privilege(a.job_card_for(&id)).await.unwrap();
        a.report_task_execution_failure(card, "boom").await.unwrap();
        assert_eq!(store.get_task("t1").await.unwrap().unwrap().status, TaskStatus::Failed);

        let other = b.request_execution_privilege(b.job_card_for(&id)).await.unwrap();
        assert_eq!(other.status, GrantedStatus::Waiting);
    }

    #[tokio::test]
    async fn test_cancelled_card_is_not_regranted() {
        let store = Arc::new(InMemoryTaskStore::new());
        let id = seed(&store, "t1", Some("node-a")).await;
        let coord = coordinator(store.clone(), "node-a", 0);

        let card = coord.request_execution_privilege(coord.job_card_for(&id)).await.unwrap();
        let cancelled = coord.report_task_cancellation(card).await.unwrap();
        assert_eq!(cancelled.status, GrantedStatus::Cancelled);
        assert_eq!(store.get_task("t1").await.unwrap().unwrap().status, TaskStatus::Cancelled);

        let retry = coord.request_execution_privilege(coord.job_card_for(&id)).await.unwrap();
        assert!(!retry.is_executing());
        assert_eq!(store.get_task("t1").await.unwrap().unwrap().status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_withdrawn_waiting_card_frees_task() {
        let store = Arc::new(InMemoryTaskStore::new());
        let id = seed(&store, "t1", None).await;
        let slow = coordinator(store.clone(), "node-a", 60_000);
        let fast = coordinator(store.clone(), "node-b", 0);

        let waiting = slow.request_execution_privilege(slow.job_card_for(&id)).await.unwrap();
        assert_eq!(waiting.status, GrantedStatus::Waiting);

        let withdrawn = slow.report_task_cancellation(waiting).await.unwrap();
        assert_eq!(withdrawn.status, GrantedStatus::Cancelled);
        assert_eq!(store.get_task("t1").await.unwrap().unwrap().status, TaskStatus::Pending);
        assert!(store.job_cards_for_task("t1").await.unwrap().is_empty());

        let granted = fast.request_execution_privilege(fast.job_card_for(&id)).await.unwrap();
        assert_eq!(granted.status, GrantedStatus::Executing);
        assert_eq!(store.get_task("t1").await.unwrap().unwrap().status, TaskStatus::Executing);
    }

    #[tokio::test]
    async fn test_withdrawn_card_may_request_again() {
        let store = Arc::new(InMemoryTaskStore::new());
        let id = seed(&store, "t1", None).await;
        let coord = coordinator(store.clone(), "node-a", 0);
        let patient = coordinator(store.clone(), "node-b", 60_000);

        let waiting = patient.request_execution_privilege(patient.job_card_for(&id)).await.unwrap();
        patient.report_task_cancellation(waiting).await.unwrap();

        let again = patient.request_execution_privilege(patient.job_card_for(&id)).await.unwrap();
        assert_eq!(again.status, GrantedStatus::Waiting);

        let granted = coord.request_execution_privilege(coord.job_card_for(&id)).await.unwrap();
        assert_eq!(granted.status, GrantedStatus::Executing);
    }

    #[tokio::test]
    async fn test_concluded_tasks_leave_no_cards_or_locks() {
        let store = Arc::new(InMemoryTaskStore::new());
        let coord = coordinator(store.clone(), "node-a", 60_000);
        let other = coordinator(store.clone(), "node-b", 60_000);

        for i in 0..200 {
            let id = seed(&store, &format!("t{i}"), Some("node-a")).await;
            // A denied card from another process is cleaned up with the task
            other.request_execution_privilege(other.job_card_for(&id)).await.unwrap();

            let card = coord.request_execution_privilege(coord.job_card_for(&id)).await.unwrap();
            let card = coord.report_task_execution_start(card).await.unwrap();
            coord.report_task_execution_finish(card, "ok").await.unwrap();
        }

        assert_eq!(store.card_count(), 0);
        assert_eq!(store.lock_count(), 0);
        assert_eq!(coord.metrics().finished, 200);

        // Late requests against finished tasks do not leak either
        let late = other.request_execution_privilege(other.job_card_for(&TaskId::new(1, 1, "t0"))).await.unwrap();
        assert!(!late.is_executing());
        assert_eq!(store.card_count(), 0);
        assert_eq!(store.lock_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_task_drops_cards() {
        let store = Arc::new(InMemoryTaskStore::new());
        let id = seed(&store, "t1", None).await;
        let coord = coordinator(store.clone(), "node-a", 60_000);

        coord.request_execution_privilege(coord.job_card_for(&id)).await.unwrap();
        assert_eq!(store.card_count(), 1);

        assert!(coord.cancel_task("t1").await.unwrap());
        assert_eq!(store.card_count(), 0);
        assert_eq!(store.lock_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_task_without_cards() {
        let store = Arc::new(InMemoryTaskStore::new());
        let id = seed(&store, "t1", None).await;
        let coord = coordinator(store.clone(), "node-a", 0);

        assert!(coord.cancel_task("t1").await.unwrap());
        assert!(!coord.cancel_task("t1").await.unwrap());
        assert!(!coord.cancel_task("missing").await.unwrap());

        let card = coord.request_execution_privilege(coord.job_card_for(&id)).await.unwrap();
        assert!(!card.is_executing());
    }
}
