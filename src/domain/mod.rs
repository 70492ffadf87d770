//! Domain types for the coordination core
//!
//! Core domain types: Task, JobCard, Participant, DataParcelManifest.
//! All are plain serde records; synchronisation lives in the store.

mod id;
mod job_card;
mod manifest;
mod participant;
mod task;

pub use id::{TaskId, TaskSequence};
pub use job_card::{GrantedStatus, JobCard};
pub use manifest::{DataParcelManifest, ManifestCriteria, ParcelDirection};
pub use participant::{Participant, ParticipantStatus};
pub use task::{PayloadRef, Task, TaskStatus};

/// Current time as Unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
