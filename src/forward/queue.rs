//! Generic asynchronous forward queue

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ticker::{RunGuard, spawn_ticker};

use super::config::{DeliveryPolicy, QueueConfig};
use super::deliverer::Deliverer;

/// Outcome of one flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub delivered: usize,
    pub failed: usize,
    /// Items discarded without a delivery attempt
    pub dropped: usize,
    /// Items left queued for the next flush
    pub remaining: usize,
}

/// Lifetime counters for a queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub enqueued: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
    pub flushes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    flushes: AtomicU64,
}

/// Buffers items and delivers them on a timer
///
/// `enqueue` only touches the buffer; delivery happens in `flush`, which
/// never runs concurrently with itself.
pub struct ForwardQueue<T> {
    name: String,
    config: QueueConfig,
    items: Mutex<VecDeque<T>>,
    deliverer: Arc<dyn Deliverer<T>>,
    flushing: AtomicBool,
    scheduled: AtomicBool,
    counters: Counters,
}

impl<T> ForwardQueue<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, config: QueueConfig, deliverer: Arc<dyn Deliverer<T>>) -> Self {
        let name = name.into();
        debug!(%name, policy = %config.policy, "ForwardQueue::new: called");
        Self {
            name,
            config,
            items: Mutex::new(VecDeque::new()),
            deliverer,
            flushing: AtomicBool::new(false),
            scheduled: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> DeliveryPolicy {
        self.config.policy
    }

    /// Append an item
    pub async fn enqueue(&self, item: T) {
        self.items.lock().await.push_back(item);
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    pub fn stats(&self) -> ForwardStats {
        ForwardStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            flushes: self.counters.flushes.load(Ordering::Relaxed),
        }
    }

    /// Deliver queued items according to the policy
    ///
    /// Returns `None` if another flush is in progress.
    pub async fn flush(&self) -> Option<FlushReport> {
        let Some(_guard) = RunGuard::try_acquire(&self.flushing) else {
            debug!(queue = %self.name, "flush: already flushing, skipping");
            return None;
        };

        let report = match self.config.policy {
            DeliveryPolicy::DrainThenSend => self.drain_then_send().await,
            DeliveryPolicy::SendThenRemove => self.send_then_remove().await,
        };

        self.counters.flushes.fetch_add(1, Ordering::Relaxed);
        self.counters.delivered.fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.counters.failed.fetch_add(report.failed as u64, Ordering::Relaxed);
        self.counters.dropped.fetch_add(report.dropped as u64, Ordering::Relaxed);

        if report.delivered > 0 || report.failed > 0 {
            debug!(queue = %self.name, ?report, "flush: complete");
        }
        Some(report)
    }

    async fn drain_then_send(&self) -> FlushReport {
        let batch: Vec<T> = self.items.lock().await.drain(..).collect();
        let mut report = FlushReport::default();

        for (i, item) in batch.iter().enumerate() {
            if let Err(e) = self.deliverer.deliver(item).await {
                report.failed = 1;
                report.dropped = batch.len() - i - 1;
                warn!(queue = %self.name, error = %e, dropped = %report.dropped, "Delivery failed, dropping rest of batch");
                break;
            }
            report.delivered += 1;
        }
        report
    }

    async fn send_then_remove(&self) -> FlushReport {
        let mut report = FlushReport::default();

        loop {
            // Only this flush removes items, so the head stays put between peek and pop
            let Some(head) = self.items.lock().await.front().cloned() else {
                break;
            };

            match self.deliverer.deliver(&head).await {
                Ok(()) => {
                    self.items.lock().await.pop_front();
                    report.delivered += 1;
                }
                Err(e) => {
                    report.failed = 1;
                    warn!(queue = %self.name, error = %e, "Delivery failed, keeping head for retry");
                    break;
                }
            }
        }
        report.remaining = self.items.lock().await.len();
        report
    }

    /// Flush periodically until cancelled
    ///
    /// Returns false if the queue was already scheduled.
    pub fn schedule(self: &Arc<Self>, cancel: CancellationToken) -> bool {
        if self.scheduled.swap(true, Ordering::AcqRel) {
            debug!(queue = %self.name, "schedule: already scheduled");
            return false;
        }
        info!(queue = %self.name, period_ms = %self.config.period_ms, "Scheduling forward queue");

        let queue = self.clone();
        spawn_ticker(
            format!("forward-{}", self.name),
            self.config.initial_delay(),
            self.config.period(),
            cancel,
            move || {
                let queue = queue.clone();
                async move {
                    queue.flush().await;
                }
            },
        );
        true
    }
}
