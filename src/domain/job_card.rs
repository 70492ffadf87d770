//! JobCard domain type
//!
//! Coordination record for one (task, process) execution attempt. Locks for
//! a card live in the store's lock table, not in the record.

use serde::{Deserialize, Serialize};

use super::id::TaskId;
use super::now_ms;

/// Execution right granted on a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GrantedStatus {
    /// Requested, not (yet) granted
    #[default]
    Waiting,
    /// Holder may execute the task
    Executing,
    Finished,
    Failed,
    Cancelled,
}

impl GrantedStatus {
    /// Check if this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for GrantedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Executing => write!(f, "executing"),
            Self::Finished => write!(f, "finished"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Coordination record for one execution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCard {
    /// Card id, `{task key}@{process id}`
    pub id: String,

    pub task_id: TaskId,

    /// Process that asked to execute
    pub process_id: String,

    pub status: GrantedStatus,

    /// When the card was first registered (Unix milliseconds, never refreshed)
    pub registered_at: i64,

    /// Last status change or privilege check (Unix milliseconds)
    pub last_update: i64,

    /// When execution was reported as started
    #[serde(default)]
    pub started_at: Option<i64>,

    /// Finish summary or failure reason
    #[serde(default)]
    pub note: Option<String>,
}

impl JobCard {
    /// Create a waiting card for a task and process
    pub fn new(task_id: TaskId, process_id: impl Into<String>) -> Self {
        let process_id = process_id.into();
        let now = now_ms();
        Self {
            id: Self::card_id(&task_id, &process_id),
            task_id,
            process_id,
            status: GrantedStatus::Waiting,
            registered_at: now,
            last_update: now,
            started_at: None,
            note: None,
        }
    }

    /// Deterministic card id for a task and process
    pub fn card_id(task_id: &TaskId, process_id: &str) -> String {
        format!("{}@{}", task_id.as_str(), process_id)
    }

    /// Update the status
    pub fn set_status(&mut self, status: GrantedStatus) {
        self.status = status;
        self.touch();
    }

    /// Record a check without changing status
    pub fn touch(&mut self) {
        self.last_update = now_ms();
    }

    /// Milliseconds since registration
    pub fn age_ms(&self, now: i64) -> i64 {
        now - self.registered_at
    }

    pub fn is_executing(&self) -> bool {
        self.status == GrantedStatus::Executing
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_card_is_waiting() {
        let card = JobCard::new(TaskId::new(1, 1, "task-a"), "node-1");
        assert_eq!(card.id, "task-a@node-1");
        assert_eq!(card.status, GrantedStatus::Waiting);
        assert_eq!(card.registered_at, card.last_update);
        assert!(!card.is_executing());
        assert!(!card.is_terminal());
    }

    #[test]
    fn test_set_status_keeps_registration() {
        let mut card = JobCard::new(TaskId::new(1, 1, "task-a"), "node-1");
        card.registered_at -= 1_000;
        let registered = card.registered_at;
        card.set_status(GrantedStatus::Executing);
        assert_eq!(card.registered_at, registered);
        assert!(card.last_update > registered);
        assert!(card.is_executing());
    }

    #[test]
    fn test_terminal() {
        assert!(GrantedStatus::Finished.is_terminal());
        assert!(GrantedStatus::Failed.is_terminal());
        assert!(GrantedStatus::Cancelled.is_terminal());
        assert!(!GrantedStatus::Executing.is_terminal());
        assert!(!GrantedStatus::Waiting.is_terminal());
    }

    #[test]
    fn test_age() {
        let mut card = JobCard::new(TaskId::new(1, 1, "t"), "n");
        card.registered_at = 1_000;
        assert_eq!(card.age_ms(1_250), 250);
    }
}
