//! ParticipantWorker - executes dispatched tasks under the coordinator

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use eyre::{Context, Result, eyre};
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::coordinator::ExecutionCoordinator;
use crate::dispatch::DispatchAssignment;
use crate::domain::{GrantedStatus, JobCard, ParticipantStatus, TaskId};
use crate::forward::{AuditRecord, Forwarders, MetricRecord};
use crate::interfaces::TaskExecutor;
use crate::registry::ParticipantRegistry;
use crate::store::{StoreError, TaskStore};
use crate::ticker::panic_message;
use crate::traceability::{TraceabilityBuilder, TraceabilityElement};

/// Result of handling one assignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    /// Privilege not granted; the task went back to the queue
    Denied { status: GrantedStatus },
    Finished { summary: String },
    Failed { reason: String },
}

/// Runs assignments for the participants of this process
pub struct ParticipantWorker {
    coordinator: Arc<ExecutionCoordinator>,
    registry: Arc<ParticipantRegistry>,
    store: Arc<dyn TaskStore>,
    traceability: Arc<TraceabilityBuilder>,
    forwarders: Arc<Forwarders>,
    executor: Arc<dyn TaskExecutor>,
}

impl ParticipantWorker {
    pub fn new(
        coordinator: Arc<ExecutionCoordinator>,
        registry: Arc<ParticipantRegistry>,
        store: Arc<dyn TaskStore>,
        traceability: Arc<TraceabilityBuilder>,
        forwarders: Arc<Forwarders>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        Self {
            coordinator,
            registry,
            store,
            traceability,
            forwarders,
            executor,
        }
    }

    /// Request privilege for an assignment and, if granted, execute it
    pub async fn handle(&self, assignment: DispatchAssignment) -> Result<WorkOutcome> {
        let DispatchAssignment { participant, task } = assignment;
        debug!(%participant, task_id = %task.id, "handle: called");

        let card = self.coordinator.job_card_for(&task.id);
        let card = self
            .coordinator
            .request_execution_privilege(card)
            .await
            .context("Privilege request failed")?;

        if !card.is_executing() {
            debug!(%participant, task_id = %task.id, status = %card.status, "handle: denied, requeueing");
            match self.store.requeue(task.key()).await {
                Ok(_) | Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e).context("Failed to requeue denied task"),
            }
            self.release(&participant);
            return Ok(WorkOutcome::Denied { status: card.status });
        }

        if let Err(e) = self.registry.set_status(&participant, ParticipantStatus::Busy) {
            warn!(%participant, error = %e, "handle: participant not registered");
        }
        let card = match self.coordinator.report_task_execution_start(card.clone()).await {
            Ok(card) => card,
            Err(e) => {
                error!(%participant, task_id = %task.id, error = %e, "Failed to record execution start");
                self.abandon(card, &participant, format!("start not recorded: {e}")).await;
                return Err(e).context("Failed to record execution start");
            }
        };

        let started = Instant::now();
        let executed = match AssertUnwindSafe(self.executor.execute(&participant, &task))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(eyre!("executor panicked: {}", panic_message(panic.as_ref()))),
        };
        let (outcome, concluded) = match executed {
            Ok(summary) => {
                let concluded = self
                    .coordinator
                    .report_task_execution_finish(card.clone(), summary.clone())
                    .await;
                (WorkOutcome::Finished { summary }, concluded)
            }
            Err(e) => {
                let reason = format!("{e:#}");
                warn!(%participant, task_id = %task.id, %reason, "Task execution failed");
                let concluded = self
                    .coordinator
                    .report_task_execution_failure(card.clone(), reason.clone())
                    .await;
                (WorkOutcome::Failed { reason }, concluded)
            }
        };
        let card = match concluded {
            Ok(card) => card,
            Err(e) => {
                error!(%participant, task_id = %task.id, error = %e, "Failed to record task outcome");
                self.abandon(card, &participant, format!("outcome not recorded: {e}")).await;
                return Err(e).context("Failed to record task outcome");
            }
        };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;

        let note = card.note.clone().unwrap_or_default();
        let element = TraceabilityElement::new(task.id.clone(), participant.clone(), note.clone(), card.status);
        self.traceability
            .append_task_journey(&task.id, element)
            .await
            .context("Failed to record traceability")?;

        self.forwarders
            .audit
            .enqueue(AuditRecord::new(
                task.id.clone(),
                participant.clone(),
                card.process_id.clone(),
                card.status,
                note,
            ))
            .await;
        self.forwarders
            .metrics
            .enqueue(MetricRecord::new("task.duration", elapsed_ms, "ms").for_participant(participant.clone()))
            .await;

        self.release(&participant);
        info!(%participant, task_id = %task.id, status = %card.status, "Task handled");
        Ok(outcome)
    }

    /// Best effort to stop a granted card from holding its task forever
    async fn abandon(&self, card: JobCard, participant: &str, reason: String) {
        let task_key = card.task_id.as_str().to_string();
        match self.coordinator.report_task_execution_failure(card, reason).await {
            Ok(card) if card.is_terminal() => {}
            Ok(card) => {
                warn!(%participant, %task_key, status = %card.status, "abandon: card not concluded, cancelling task");
                if let Err(e) = self.coordinator.cancel_task(&task_key).await {
                    error!(%participant, %task_key, error = %e, "abandon: cancel failed");
                }
            }
            Err(e) => {
                warn!(%participant, %task_key, error = %e, "abandon: failure report failed, cancelling task");
                if let Err(e) = self.coordinator.cancel_task(&task_key).await {
                    error!(%participant, %task_key, error = %e, "abandon: cancel failed");
                }
            }
        }
        self.release(participant);
    }

    fn release(&self, participant: &str) {
        if let Err(e) = self.registry.set_status(participant, ParticipantStatus::Idle) {
            debug!(%participant, error = %e, "release: participant gone");
        }
    }

    /// Clean up after a panic somewhere in `handle`
    async fn recover(&self, participant: &str, task_id: &TaskId) {
        let task_key = task_id.as_str();
        let card_id = JobCard::card_id(task_id, &self.coordinator.process_id());
        match self.store.get_job_card(&card_id).await {
            Ok(Some(card)) if card.is_executing() => {
                self.abandon(card, participant, "worker panicked".to_string()).await;
                return;
            }
            Ok(_) => {}
            Err(e) => warn!(%participant, %task_key, error = %e, "recover: card lookup failed"),
        }
        match self.store.requeue(task_key).await {
            Ok(_) | Err(StoreError::NotFound(_)) => {}
            Err(e) => warn!(%participant, %task_key, error = %e, "recover: requeue failed"),
        }
        self.release(participant);
    }

    /// Handle assignments from the dispatch channel until cancelled
    ///
    /// Each assignment runs on its own task so participants execute concurrently.
    pub fn run(self: Arc<Self>, mut rx: mpsc::Receiver<DispatchAssignment>, cancel: CancellationToken) -> JoinHandle<()> {
        info!("Starting participant worker");
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!("Participant worker stopped");
                        break;
                    }
                    next = rx.recv() => {
                        let Some(assignment) = next else {
                            info!("Dispatch channel closed, worker exiting");
                            break;
                        };
                        let worker = self.clone();
                        tokio::spawn(async move {
                            let participant = assignment.participant.clone();
                            let task_id = assignment.task.id.clone();
                            match AssertUnwindSafe(worker.handle(assignment)).catch_unwind().await {
                                Ok(Ok(_)) => {}
                                Ok(Err(e)) => {
                                    error!(%participant, error = %e, "Assignment failed");
                                    worker.release(&participant);
                                }
                                Err(panic) => {
                                    error!(%participant, %task_id, panic = %panic_message(panic.as_ref()), "Assignment panicked");
                                    worker.recover(&participant, &task_id).await;
                                }
                            }
                        });
                    }
                }
            }
        })
    }
}
