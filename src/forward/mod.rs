//! Asynchronous forward queues
//!
//! Observations (audit records, metrics, topology snapshots, subscription
//! reports) are buffered per kind and flushed to collectors on a timer.

mod config;
mod deliverer;
mod observations;
mod queue;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::interfaces::{PayloadCodec, PersistenceWriter, Transport};

pub use config::{DeliveryPolicy, ForwardConfig, QueueConfig};
pub use deliverer::{Deliverer, PersistenceDeliverer, TransportDeliverer};
pub use observations::{AuditRecord, MetricRecord, SubscriptionReport, TopologySnapshot};
pub use queue::{FlushReport, ForwardQueue, ForwardStats};

/// Flush reports from one `Forwarders::flush_all` call, per queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushAllReport {
    pub audit: Option<FlushReport>,
    pub metrics: Option<FlushReport>,
    pub topology: Option<FlushReport>,
    pub subscriptions: Option<FlushReport>,
}

/// The four standard forward queues
pub struct Forwarders {
    pub audit: Arc<ForwardQueue<AuditRecord>>,
    pub metrics: Arc<ForwardQueue<MetricRecord>>,
    pub topology: Arc<ForwardQueue<TopologySnapshot>>,
    pub subscriptions: Arc<ForwardQueue<SubscriptionReport>>,
}

impl Forwarders {
    /// Build queues that send through a transport
    ///
    /// Audit records go to the persistence writer when one is given.
    pub fn new(
        config: &ForwardConfig,
        transport: Arc<dyn Transport>,
        codec: Arc<dyn PayloadCodec>,
        persistence: Option<Arc<dyn PersistenceWriter>>,
    ) -> Self {
        debug!(persist_audit = persistence.is_some(), "Forwarders::new: called");
        let via = |target: &str| -> Arc<TransportDeliverer> {
            Arc::new(TransportDeliverer::new(transport.clone(), codec.clone(), target))
        };

        let audit: Arc<dyn Deliverer<AuditRecord>> = match persistence {
            Some(writer) => Arc::new(PersistenceDeliverer::new(writer)),
            None => via(&config.audit.target),
        };

        Self {
            audit: Arc::new(ForwardQueue::new("audit", config.audit.clone(), audit)),
            metrics: Arc::new(ForwardQueue::new("metrics", config.metrics.clone(), via(&config.metrics.target))),
            topology: Arc::new(ForwardQueue::new(
                "topology",
                config.topology.clone(),
                via(&config.topology.target),
            )),
            subscriptions: Arc::new(ForwardQueue::new(
                "subscriptions",
                config.subscriptions.clone(),
                via(&config.subscriptions.target),
            )),
        }
    }

    /// Arm every queue's ticker; returns how many were newly scheduled
    pub fn schedule_all(&self, cancel: &CancellationToken) -> usize {
        let armed = [
            self.audit.schedule(cancel.clone()),
            self.metrics.schedule(cancel.clone()),
            self.topology.schedule(cancel.clone()),
            self.subscriptions.schedule(cancel.clone()),
        ]
        .into_iter()
        .filter(|armed| *armed)
        .count();
        info!(%armed, "Forward queues scheduled");
        armed
    }

    /// Flush all queues concurrently
    pub async fn flush_all(&self) -> FlushAllReport {
        let (audit, metrics, topology, subscriptions) = futures::join!(
            self.audit.flush(),
            self.metrics.flush(),
            self.topology.flush(),
            self.subscriptions.flush()
        );
        FlushAllReport {
            audit,
            metrics,
            topology,
            subscriptions,
        }
    }
}
