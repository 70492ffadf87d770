//! parcelcoord - task coordination core for healthcare integration
//!
//! Data parcels published by one participant are routed to every
//! subscribed participant as tasks. Cooperating processes share one task
//! store and agree, per task, on which process may execute it.
//!
//! # Core Concepts
//!
//! - **Execution privilege**: at most one job card per task holds EXECUTING
//! - **Node affinity**: a pinned task runs only on its target process
//! - **Convergence wait**: unpinned tasks wait out store propagation delay
//! - **Forward queues**: observations are buffered and flushed on a timer
//!
//! # Modules
//!
//! - [`coordinator`] - Execution-privilege decisions
//! - [`dispatch`] - Periodic hand-off of pending tasks to idle participants
//! - [`subscription`] - Manifest criteria and recipient resolution
//! - [`forward`] - Generic forward queue and the four observation queues
//! - [`traceability`] - Append-only task lineage
//! - [`store`] - Task and job card store with per-entity locks
//! - [`flow`] - Router, worker and node wiring
//! - [`config`] - Configuration types and loading

pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod domain;
pub mod flow;
pub mod forward;
pub mod interfaces;
pub mod logging;
pub mod registry;
pub mod store;
pub mod subscription;
pub mod ticker;
pub mod traceability;

// Re-export commonly used types
pub use config::{Config, LoggingConfig};
pub use coordinator::{CoordinatorConfig, CoordinatorError, CoordinatorMetrics, ExecutionCoordinator};
pub use dispatch::{DispatchAssignment, DispatchConfig, DispatchDaemon, PassReport};
pub use domain::{
    DataParcelManifest, GrantedStatus, JobCard, ManifestCriteria, ParcelDirection, Participant, ParticipantStatus,
    PayloadRef, Task, TaskId, TaskSequence, TaskStatus,
};
pub use flow::{Collaborators, CoordinationNode, ParcelRouter, ParticipantWorker, WorkOutcome};
pub use forward::{
    AuditRecord, DeliveryPolicy, Deliverer, FlushReport, ForwardConfig, ForwardQueue, ForwardStats, Forwarders,
    MetricRecord, QueueConfig, SubscriptionReport, TopologySnapshot,
};
pub use interfaces::{
    JsonCodec, PayloadCodec, PersistenceWriter, ProcessIdentity, StaticIdentity, TaskExecutor, Transport,
};
pub use registry::{ParticipantRegistry, RegistryError};
pub use store::{InMemoryTaskStore, StoreError, TaskStore};
pub use subscription::{SubscriptionError, SubscriptionMap, SubscriptionMatcher};
pub use traceability::{TraceabilityBuilder, TraceabilityChain, TraceabilityElement};
