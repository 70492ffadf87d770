//! Execution-privilege coordinator
//!
//! Decides, per task, which process holds the right to execute it. Node
//! affinity pins a task to one process; unpinned tasks wait out a
//! convergence window measured from the card's first registration.

mod config;
mod core;
mod messages;

pub use config::{CoordinatorConfig, DEFAULT_CONVERGENCE_WAIT_MS};
pub use core::ExecutionCoordinator;
pub use messages::{CoordinatorError, CoordinatorMetrics};
