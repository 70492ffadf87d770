//! Task identity and sequence generation
//!
//! A task id carries a monotonic `(major, minor)` sequence number next to an
//! opaque UUIDv7 key. Display format: `{major}.{minor}-{key}`.
//! Example: `1760612345000.7-01928f3a-...`

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::now_ms;

/// Identity of a task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId {
    /// Sequence epoch, fixed for the lifetime of a generator
    pub major: u64,

    /// Position within the epoch
    pub minor: u64,

    /// Opaque unique key, used for store lookups and locking
    pub key: String,
}

impl TaskId {
    /// Create a task id from explicit parts (for testing or recovery)
    pub fn new(major: u64, minor: u64, key: impl Into<String>) -> Self {
        Self {
            major,
            minor,
            key: key.into(),
        }
    }

    /// The opaque key
    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl Ord for TaskId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
            .then_with(|| self.key.cmp(&other.key))
    }
}

impl PartialOrd for TaskId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}-{}", self.major, self.minor, self.key)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

/// Monotonic task id generator
///
/// Cloning is not supported; share it behind an `Arc`.
#[derive(Debug)]
pub struct TaskSequence {
    major: u64,
    minor: AtomicU64,
}

impl TaskSequence {
    /// Create a generator whose epoch is the current time
    pub fn new() -> Self {
        Self::with_major(now_ms().max(0) as u64)
    }

    /// Create a generator with a fixed epoch
    pub fn with_major(major: u64) -> Self {
        debug!(major, "TaskSequence::with_major: called");
        Self {
            major,
            minor: AtomicU64::new(0),
        }
    }

    /// Issue the next task id
    pub fn next_id(&self) -> TaskId {
        let minor = self.minor.fetch_add(1, Ordering::SeqCst) + 1;
        TaskId {
            major: self.major,
            minor,
            key: uuid::Uuid::now_v7().to_string(),
        }
    }

    /// The epoch of this generator
    pub fn major(&self) -> u64 {
        self.major
    }
}

impl Default for TaskSequence {
    fn default() -> Self {
        Self::new()
    }
}
