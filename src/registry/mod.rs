//! Participant registry
//!
//! Known workers and their availability, shared as an `Arc` handle by the
//! dispatch daemon, the subscription matcher and the workers.

mod core;

pub use core::{ParticipantRegistry, RegistryError};
