//! Task domain type
//!
//! A Task is one unit of work queued for a participant.

use serde::{Deserialize, Serialize};

use super::id::TaskId;
use super::manifest::DataParcelManifest;
use super::now_ms;
use crate::traceability::TraceabilityChain;

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, waiting for dispatch
    #[default]
    Pending,
    /// Handed to a participant, privilege not yet granted
    Assigned,
    /// Execution privilege granted
    Executing,
    Finished,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Check if this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Assigned => write!(f, "assigned"),
            Self::Executing => write!(f, "executing"),
            Self::Finished => write!(f, "finished"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Reference to a payload held outside the core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadRef {
    /// Opaque payload identifier
    pub id: String,

    /// Descriptor the payload was published with
    pub manifest: DataParcelManifest,
}

impl PayloadRef {
    pub fn new(id: impl Into<String>, manifest: DataParcelManifest) -> Self {
        Self { id: id.into(), manifest }
    }
}

/// A unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,

    pub status: TaskStatus,

    /// Participant name this task is queued for
    #[serde(rename = "queued-for")]
    pub queued_for: String,

    /// Process that must execute this task, if pinned
    #[serde(rename = "node-affinity", default)]
    pub node_affinity: Option<String>,

    pub payload: PayloadRef,

    /// Execution lineage, inherited from upstream tasks
    #[serde(default)]
    pub traceability: TraceabilityChain,

    /// Creation timestamp (Unix milliseconds)
    #[serde(rename = "created-at")]
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    #[serde(rename = "updated-at")]
    pub updated_at: i64,
}

impl Task {
    /// Create a pending task queued for a participant
    pub fn new(id: TaskId, queued_for: impl Into<String>, payload: PayloadRef) -> Self {
        let now = now_ms();
        Self {
            id,
            status: TaskStatus::Pending,
            queued_for: queued_for.into(),
            node_affinity: None,
            payload,
            traceability: TraceabilityChain::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder method to pin the task to a process
    pub fn with_affinity(mut self, process_id: impl Into<String>) -> Self {
        self.node_affinity = Some(process_id.into());
        self
    }

    /// Builder method to inherit an upstream lineage
    pub fn with_traceability(mut self, chain: TraceabilityChain) -> Self {
        self.traceability = chain;
        self
    }

    /// The store key of this task
    pub fn key(&self) -> &str {
        self.id.as_str()
    }

    /// Update the status
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.touch();
    }

    /// Bump the update timestamp
    pub fn touch(&mut self) {
        self.updated_at = now_ms();
    }

    /// Check if the task is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParcelDirection;

    fn sample() -> Task {
        let manifest = DataParcelManifest::new("patient", "admit", ParcelDirection::Inbound);
        Task::new(TaskId::new(1, 1, "t-1"), "adt-router", PayloadRef::new("p-1", manifest))
    }

    #[test]
    fn test_new_task_is_pending() {
        let task = sample();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.queued_for, "adt-router");
        assert!(task.node_affinity.is_none());
        assert!(task.traceability.is_empty());
        assert_eq!(task.key(), "t-1");
    }

    #[test]
    fn test_terminal_states() {
        let mut task = sample();
        assert!(!task.is_terminal());
        for status in [TaskStatus::Finished, TaskStatus::Failed, TaskStatus::Cancelled] {
            task.set_status(status);
            assert!(task.is_terminal());
        }
        task.set_status(TaskStatus::Executing);
        assert!(!task.is_terminal());
    }

    #[test]
    fn test_affinity_builder() {
        let task = sample().with_affinity("node-a");
        assert_eq!(task.node_affinity.as_deref(), Some("node-a"));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(TaskStatus::Executing.to_string(), "executing");
        assert_eq!(TaskStatus::Cancelled.to_string(), "cancelled");
    }
}
