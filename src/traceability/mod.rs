//! Task lineage
//!
//! Each task carries an append-only chain of the steps that led to it.

mod builder;
mod chain;

pub use builder::TraceabilityBuilder;
pub use chain::{TraceabilityChain, TraceabilityElement};
