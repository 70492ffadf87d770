//! DispatchDaemon implementation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use eyre::{Context, Result, eyre};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::{ParticipantStatus, Task};
use crate::registry::ParticipantRegistry;
use crate::store::TaskStore;
use crate::ticker::{RunGuard, spawn_ticker};

use super::config::DispatchConfig;

/// A task handed to a participant
#[derive(Debug, Clone)]
pub struct DispatchAssignment {
    pub participant: String,
    pub task: Task,
}

/// Outcome of one dispatch pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub iterations: u32,
    pub assigned: usize,
}

#[derive(Debug, Default)]
struct Iteration {
    assigned: usize,
    saturated: bool,
}

/// Pulls pending tasks for idle participants
pub struct DispatchDaemon {
    config: DispatchConfig,
    registry: Arc<ParticipantRegistry>,
    store: Arc<dyn TaskStore>,
    tx: mpsc::Sender<DispatchAssignment>,
    running: AtomicBool,
}

impl DispatchDaemon {
    pub fn new(
        config: DispatchConfig,
        registry: Arc<ParticipantRegistry>,
        store: Arc<dyn TaskStore>,
        tx: mpsc::Sender<DispatchAssignment>,
    ) -> Self {
        debug!(?config, "DispatchDaemon::new: called");
        Self {
            config,
            registry,
            store,
            tx,
            running: AtomicBool::new(false),
        }
    }

    /// Whether a pass is in progress
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one pass unless another is already in progress
    ///
    /// Returns `None` when skipped.
    pub async fn try_run_pass(&self) -> Option<Result<PassReport>> {
        let Some(_guard) = RunGuard::try_acquire(&self.running) else {
            debug!("try_run_pass: pass already running, skipping");
            return None;
        };
        Some(self.run_pass().await)
    }

    /// Up to `max_iterations` iterations, stopping after one that assigns nothing
    ///
    /// A full channel also ends the pass; the worker side is behind and the
    /// unsent task goes back to the queue for a later pass.
    async fn run_pass(&self) -> Result<PassReport> {
        debug!(max_iterations = %self.config.max_iterations, "run_pass: called");
        let mut report = PassReport::default();

        loop {
            report.iterations += 1;
            let iteration = self.run_iteration().await?;
            report.assigned += iteration.assigned;

            if iteration.saturated {
                debug!(assigned = %report.assigned, "run_pass: channel full, ending pass");
                break;
            }
            if iteration.assigned == 0 || report.iterations >= self.config.max_iterations {
                break;
            }
        }

        if report.assigned > 0 {
            info!(iterations = %report.iterations, assigned = %report.assigned, "Dispatch pass complete");
        } else {
            debug!(iterations = %report.iterations, "run_pass: nothing to dispatch");
        }
        Ok(report)
    }

    async fn run_iteration(&self) -> Result<Iteration> {
        let mut iteration = Iteration::default();

        for participant in self.registry.idle_participants() {
            let Some(task) = self
                .store
                .next_pending_for(&participant.name)
                .await
                .context("Failed to pull pending task")?
            else {
                continue;
            };
            let key = task.key().to_string();

            if let Err(e) = self.registry.set_status(&participant.name, ParticipantStatus::Assigned) {
                warn!(participant = %participant.name, task = %key, error = %e, "run_iteration: participant vanished, requeueing");
                self.store.requeue(&key).await.context("Failed to requeue task")?;
                continue;
            }

            debug!(participant = %participant.name, task = %key, "run_iteration: assigning");
            let assignment = DispatchAssignment {
                participant: participant.name.clone(),
                task,
            };
            match self.tx.try_send(assignment) {
                Ok(()) => iteration.assigned += 1,
                Err(e) => {
                    self.store.requeue(&key).await.context("Failed to requeue task")?;
                    // Participant may have been deregistered meanwhile; nothing to reset then
                    let _ = self.registry.set_status(&participant.name, ParticipantStatus::Idle);
                    if let TrySendError::Closed(_) = e {
                        return Err(eyre!("Dispatch channel closed"));
                    }
                    iteration.saturated = true;
                    break;
                }
            }
        }
        Ok(iteration)
    }

    /// Run passes on a ticker until cancelled
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        info!(startup_delay_ms = %self.config.startup_delay_ms, period_ms = %self.config.period_ms, "Starting dispatch daemon");
        let startup_delay = self.config.startup_delay();
        let period = self.config.period();

        spawn_ticker("dispatch", startup_delay, period, cancel, move || {
            let daemon = self.clone();
            async move {
                if let Some(Err(e)) = daemon.try_run_pass().await {
                    error!(error = %e, "Dispatch pass failed");
                }
            }
        })
    }
}
