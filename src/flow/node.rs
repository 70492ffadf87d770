//! CoordinationNode - one process's wiring of the coordination core

use std::sync::Arc;

use eyre::{Context, Result, eyre};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::coordinator::ExecutionCoordinator;
use crate::dispatch::{DispatchAssignment, DispatchDaemon};
use crate::domain::{ManifestCriteria, PayloadRef, TaskId, TaskSequence};
use crate::forward::{Forwarders, TopologySnapshot};
use crate::interfaces::{PayloadCodec, PersistenceWriter, ProcessIdentity, StaticIdentity, TaskExecutor, Transport};
use crate::registry::ParticipantRegistry;
use crate::store::TaskStore;
use crate::subscription::{SubscriptionMap, SubscriptionMatcher};
use crate::traceability::TraceabilityBuilder;

use super::router::ParcelRouter;
use super::worker::ParticipantWorker;

/// External collaborators supplied by the embedding service
pub struct Collaborators {
    pub store: Arc<dyn TaskStore>,
    pub transport: Arc<dyn Transport>,
    pub codec: Arc<dyn PayloadCodec>,
    /// Audit records are persisted here when set, otherwise sent over the transport
    pub persistence: Option<Arc<dyn PersistenceWriter>>,
    pub executor: Arc<dyn TaskExecutor>,
    /// Overrides `process-id` from config
    pub identity: Option<Arc<dyn ProcessIdentity>>,
}

/// Every component of one process, built from `Config`
pub struct CoordinationNode {
    config: Config,
    identity: Arc<dyn ProcessIdentity>,
    store: Arc<dyn TaskStore>,
    registry: Arc<ParticipantRegistry>,
    matcher: Arc<SubscriptionMatcher>,
    coordinator: Arc<ExecutionCoordinator>,
    dispatch: Arc<DispatchDaemon>,
    forwarders: Arc<Forwarders>,
    router: ParcelRouter,
    worker: Arc<ParticipantWorker>,
    assignments: Mutex<Option<mpsc::Receiver<DispatchAssignment>>>,
}

impl CoordinationNode {
    pub fn new(config: Config, collaborators: Collaborators) -> Result<Self> {
        debug!(?config, "CoordinationNode::new: called");
        config.validate()?;

        let Collaborators {
            store,
            transport,
            codec,
            persistence,
            executor,
            identity,
        } = collaborators;

        let identity: Arc<dyn ProcessIdentity> = match (identity, &config.process_id) {
            (Some(identity), _) => identity,
            (None, Some(id)) => Arc::new(StaticIdentity::new(id.clone())),
            (None, None) => Arc::new(StaticIdentity::from_process()),
        };

        let registry = Arc::new(ParticipantRegistry::new());
        let matcher = Arc::new(SubscriptionMatcher::new(Arc::new(SubscriptionMap::new()), registry.clone()));
        let coordinator = Arc::new(ExecutionCoordinator::new(
            config.coordinator.clone(),
            store.clone(),
            identity.clone(),
        ));

        let (tx, rx) = mpsc::channel(config.dispatch.channel_buffer);
        let dispatch = Arc::new(DispatchDaemon::new(config.dispatch.clone(), registry.clone(), store.clone(), tx));

        let forwarders = Arc::new(Forwarders::new(&config.forwarding, transport, codec, persistence));
        let router = ParcelRouter::new(matcher.clone(), store.clone(), Arc::new(TaskSequence::new()));
        let worker = Arc::new(ParticipantWorker::new(
            coordinator.clone(),
            registry.clone(),
            store.clone(),
            Arc::new(TraceabilityBuilder::new(store.clone())),
            forwarders.clone(),
            executor,
        ));

        info!(process_id = %identity.process_id(), "Coordination node created");
        Ok(Self {
            config,
            identity,
            store,
            registry,
            matcher,
            coordinator,
            dispatch,
            forwarders,
            router,
            worker,
            assignments: Mutex::new(Some(rx)),
        })
    }

    /// Spawn the dispatch daemon, the worker loop and the forward tickers
    ///
    /// Fails if the node was already started.
    pub async fn start(&self, cancel: &CancellationToken) -> Result<Vec<JoinHandle<()>>> {
        let rx = self
            .assignments
            .lock()
            .await
            .take()
            .ok_or_else(|| eyre!("Coordination node already started"))?;

        info!(process_id = %self.process_id(), "Starting coordination node");
        let handles = vec![
            self.dispatch.clone().spawn(cancel.clone()),
            self.worker.clone().run(rx, cancel.clone()),
        ];
        self.forwarders.schedule_all(cancel);
        Ok(handles)
    }

    pub fn process_id(&self) -> String {
        self.identity.process_id()
    }

    pub fn register_participant(&self, name: &str) -> Result<bool> {
        self.registry.register(name).context("Failed to register participant")
    }

    /// Remove a participant and all of its subscriptions
    pub fn deregister_participant(&self, name: &str) -> bool {
        let known = self.registry.deregister(name).is_some();
        self.matcher.remove_participant(name);
        known
    }

    /// Subscribe a participant and forward its updated subscription report
    pub async fn subscribe(&self, criteria: ManifestCriteria, participant: &str) -> Result<bool> {
        let added = self
            .matcher
            .add_topic_subscriber(criteria, participant)
            .context("Failed to subscribe")?;
        if added {
            self.forwarders
                .subscriptions
                .enqueue(self.matcher.subscription_report(participant))
                .await;
        }
        Ok(added)
    }

    pub async fn publish(&self, payload: PayloadRef, upstream: Option<&TaskId>) -> Result<Vec<TaskId>> {
        self.router.publish(payload, upstream).await
    }

    /// Queue a snapshot of this process's participants
    pub async fn report_topology(&self) {
        let snapshot = TopologySnapshot::new(self.process_id(), self.registry.all());
        self.forwarders.topology.enqueue(snapshot).await;
    }

    /// Remove a concluded task once its lineage is no longer needed
    ///
    /// Live tasks are left alone and report false.
    pub async fn retire_task(&self, task_key: &str) -> Result<bool> {
        let Some(task) = self.store.get_task(task_key).await.context("Failed to read task")? else {
            return Ok(false);
        };
        if !task.is_terminal() {
            debug!(%task_key, status = %task.status, "retire_task: task still live");
            return Ok(false);
        }
        let retired = self.store.retire_task(task_key).await.context("Failed to retire task")?;
        info!(%task_key, "Task retired");
        Ok(retired)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ParticipantRegistry> {
        &self.registry
    }

    pub fn matcher(&self) -> &Arc<SubscriptionMatcher> {
        &self.matcher
    }

    pub fn coordinator(&self) -> &Arc<ExecutionCoordinator> {
        &self.coordinator
    }

    pub fn dispatch(&self) -> &Arc<DispatchDaemon> {
        &self.dispatch
    }

    pub fn forwarders(&self) -> &Arc<Forwarders> {
        &self.forwarders
    }

    pub fn router(&self) -> &ParcelRouter {
        &self.router
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DataParcelManifest, ParcelDirection, Task};
    use crate::interfaces::JsonCodec;
    use crate::store::InMemoryTaskStore;
    use async_trait::async_trait;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn send(&self, _target: &str, _payload: Vec<u8>) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    struct Echo;

    #[async_trait]
    impl TaskExecutor for Echo {
        async fn execute(&self, _participant: &str, task: &Task) -> Result<String> {
            Ok(task.payload.id.clone())
        }
    }

    fn collaborators() -> Collaborators {
        Collaborators {
            store: Arc::new(InMemoryTaskStore::new()),
            transport: Arc::new(NullTransport),
            codec: Arc::new(JsonCodec),
            persistence: None,
            executor: Arc::new(Echo),
            identity: None,
        }
    }

    #[test]
    fn test_process_id_from_config() {
        let config = Config {
            process_id: Some("node-9".into()),
            ..Default::default()
        };
        let node = CoordinationNode::new(config, collaborators()).unwrap();
        assert_eq!(node.process_id(), "node-9");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.dispatch.max_iterations = 0;
        assert!(CoordinationNode::new(config, collaborators()).is_err());
    }

    #[tokio::test]
    async fn test_subscribe_enqueues_report_once() {
        let node = CoordinationNode::new(Config::default(), collaborators()).unwrap();
        node.register_participant("adt").unwrap();

        assert!(node.subscribe(ManifestCriteria::any(), "adt").await.unwrap());
        assert!(!node.subscribe(ManifestCriteria::any(), "adt").await.unwrap());
        assert_eq!(node.forwarders().subscriptions.len().await, 1);

        node.report_topology().await;
        assert_eq!(node.forwarders().topology.len().await, 1);

        assert!(node.deregister_participant("adt"));
        assert!(node.matcher().subscription_report("adt").criteria.is_empty());
    }

    #[tokio::test]
    async fn test_retire_only_concluded_tasks() {
        let store = Arc::new(InMemoryTaskStore::new());
        let node = CoordinationNode::new(
            Config::default(),
            Collaborators {
                store: store.clone(),
                ..collaborators()
            },
        )
        .unwrap();
        node.register_participant("adt").unwrap();
        node.subscribe(ManifestCriteria::any(), "adt").await.unwrap();

        let manifest = DataParcelManifest::new("patient", "admit", ParcelDirection::Inbound);
        let ids = node.publish(PayloadRef::new("msg-1", manifest), None).await.unwrap();
        let key = ids[0].as_str();

        assert!(!node.retire_task(key).await.unwrap());
        assert_eq!(store.task_count(), 1);

        assert!(node.coordinator().cancel_task(key).await.unwrap());
        assert!(node.retire_task(key).await.unwrap());
        assert_eq!(store.task_count(), 0);
        assert_eq!(store.lock_count(), 0);
        assert!(!node.retire_task(key).await.unwrap());
    }

    #[tokio::test]
    async fn test_start_only_once() {
        let node = CoordinationNode::new(Config::default(), collaborators()).unwrap();
        let cancel = CancellationToken::new();

        let handles = node.start(&cancel).await.unwrap();
        assert_eq!(handles.len(), 2);
        assert!(node.start(&cancel).await.is_err());

        cancel.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
