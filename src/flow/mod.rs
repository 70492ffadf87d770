//! End-to-end glue
//!
//! Payloads enter through the router, tasks are dispatched to workers, and
//! the node wires every component together from configuration.

mod node;
mod router;
mod worker;

pub use node::{Collaborators, CoordinationNode};
pub use router::ParcelRouter;
pub use worker::{ParticipantWorker, WorkOutcome};
