//! Local dispatch daemon
//!
//! Periodically hands pending tasks to idle participants in this process.

mod config;
mod core;

pub use config::DispatchConfig;
pub use core::{DispatchAssignment, DispatchDaemon, PassReport};
