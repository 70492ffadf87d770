//! Participant domain type

use serde::{Deserialize, Serialize};

use super::now_ms;

/// Worker availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    #[default]
    Idle,
    /// Holding a dispatched task, not yet executing
    Assigned,
    Busy,
}

impl std::fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Assigned => write!(f, "assigned"),
            Self::Busy => write!(f, "busy"),
        }
    }
}

/// A worker capable of executing tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Unique participant name
    pub name: String,

    pub status: ParticipantStatus,

    /// Registration timestamp (Unix milliseconds)
    pub registered_at: i64,
}

impl Participant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ParticipantStatus::Idle,
            registered_at: now_ms(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == ParticipantStatus::Idle
    }
}
