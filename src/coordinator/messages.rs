//! Coordinator errors and metrics

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::store::StoreError;

/// Errors from coordinator operations
///
/// A denied privilege request is not an error; callers inspect the
/// returned card's status instead.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Invalid job card: {0}")]
    InvalidCard(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Coordinator metrics for observability
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorMetrics {
    pub granted: u64,
    pub denied: u64,
    pub finished: u64,
    pub failed: u64,
    pub cancelled: u64,
}

/// Live counters behind `CoordinatorMetrics`
#[derive(Debug, Default)]
pub(crate) struct MetricCounters {
    pub granted: AtomicU64,
    pub denied: AtomicU64,
    pub finished: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
}

impl MetricCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CoordinatorMetrics {
        CoordinatorMetrics {
            granted: self.granted.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            finished: self.finished.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let counters = MetricCounters::default();
        MetricCounters::bump(&counters.granted);
        MetricCounters::bump(&counters.denied);
        MetricCounters::bump(&counters.denied);

        let snap = counters.snapshot();
        assert_eq!(snap.granted, 1);
        assert_eq!(snap.denied, 2);
        assert_eq!(snap.finished, 0);
    }

    #[test]
    fn test_store_error_converts() {
        let err: CoordinatorError = StoreError::Backend("down".into()).into();
        assert_eq!(err.to_string(), "Store error: Backend error: down");
    }
}
