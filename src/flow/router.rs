//! ParcelRouter - turns published payloads into queued tasks

use std::sync::Arc;

use eyre::{Context, Result};
use tracing::{debug, info};

use crate::domain::{PayloadRef, Task, TaskId, TaskSequence};
use crate::store::TaskStore;
use crate::subscription::SubscriptionMatcher;
use crate::traceability::TraceabilityChain;

/// Creates one task per subscriber of a published payload
pub struct ParcelRouter {
    matcher: Arc<SubscriptionMatcher>,
    store: Arc<dyn TaskStore>,
    sequence: Arc<TaskSequence>,
}

impl ParcelRouter {
    pub fn new(matcher: Arc<SubscriptionMatcher>, store: Arc<dyn TaskStore>, sequence: Arc<TaskSequence>) -> Self {
        Self {
            matcher,
            store,
            sequence,
        }
    }

    /// Queue the payload for every interested participant
    ///
    /// New tasks inherit the upstream task's traceability chain. No
    /// subscribers means no tasks, not an error.
    pub async fn publish(&self, payload: PayloadRef, upstream: Option<&TaskId>) -> Result<Vec<TaskId>> {
        self.route(payload, upstream, None).await
    }

    /// Like `publish`, pinning every created task to one process
    pub async fn publish_pinned(
        &self,
        payload: PayloadRef,
        upstream: Option<&TaskId>,
        process_id: &str,
    ) -> Result<Vec<TaskId>> {
        self.route(payload, upstream, Some(process_id)).await
    }

    async fn route(&self, payload: PayloadRef, upstream: Option<&TaskId>, affinity: Option<&str>) -> Result<Vec<TaskId>> {
        debug!(payload = %payload.id, upstream = ?upstream.map(|u| u.to_string()), ?affinity, "route: called");
        let recipients = self
            .matcher
            .subscriber_set(&payload.manifest)
            .context("Failed to resolve subscribers")?;

        if recipients.is_empty() {
            info!(payload = %payload.id, category = %payload.manifest.category, data_type = %payload.manifest.data_type, "No subscribers for payload");
            return Ok(Vec::new());
        }

        let chain = match upstream {
            Some(id) => self
                .store
                .get_task(id.as_str())
                .await
                .context("Failed to load upstream task")?
                .map(|t| t.traceability)
                .unwrap_or_default(),
            None => TraceabilityChain::new(),
        };

        let mut created = Vec::with_capacity(recipients.len());
        for name in recipients {
            let mut task = Task::new(self.sequence.next_id(), name, payload.clone()).with_traceability(chain.clone());
            if let Some(process_id) = affinity {
                task = task.with_affinity(process_id);
            }
            let id = self.store.create_task(task).await.context("Failed to store task")?;
            created.push(id);
        }

        info!(payload = %payload.id, tasks = created.len(), "Payload routed");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DataParcelManifest, GrantedStatus, ManifestCriteria, ParcelDirection};
    use crate::registry::ParticipantRegistry;
    use crate::store::InMemoryTaskStore;
    use crate::subscription::SubscriptionMap;
    use crate::traceability::TraceabilityElement;

    fn setup() -> (ParcelRouter, Arc<InMemoryTaskStore>, Arc<SubscriptionMatcher>) {
        let registry = Arc::new(ParticipantRegistry::new());
        let matcher = Arc::new(SubscriptionMatcher::new(Arc::new(SubscriptionMap::new()), registry));
        let store = Arc::new(InMemoryTaskStore::new());
        let router = ParcelRouter::new(matcher.clone(), store.clone(), Arc::new(TaskSequence::with_major(7)));
        (router, store, matcher)
    }

    fn admit() -> PayloadRef {
        PayloadRef::new("msg-1", DataParcelManifest::new("patient", "admit", ParcelDirection::Inbound))
    }

    #[tokio::test]
    async fn test_one_task_per_subscriber() {
        let (router, store, matcher) = setup();
        matcher.add_topic_subscriber(ManifestCriteria::for_type("patient", "admit"), "adt").unwrap();
        matcher.add_topic_subscriber(ManifestCriteria::any(), "archive").unwrap();

        let ids = router.publish(admit(), None).await.unwrap();
        assert_eq!(ids.len(), 2);

        let mut queued: Vec<String> = store
            .list_tasks(None)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.queued_for)
            .collect();
        queued.sort();
        assert_eq!(queued, vec!["adt", "archive"]);
    }

    #[tokio::test]
    async fn test_no_subscribers_is_empty() {
        let (router, store, _matcher) = setup();
        assert!(router.publish(admit(), None).await.unwrap().is_empty());
        assert_eq!(store.task_count(), 0);
    }

    #[tokio::test]
    async fn test_inherits_upstream_chain_and_pins() {
        let (router, store, matcher) = setup();
        matcher.add_topic_subscriber(ManifestCriteria::any(), "adt").unwrap();

        let upstream = TaskId::new(1, 1, "up");
        let mut chain = TraceabilityChain::new();
        chain.append_task_journey(TraceabilityElement::new(upstream.clone(), "ingest", "ok", GrantedStatus::Finished));
        store
            .create_task(Task::new(upstream.clone(), "ingest", admit()).with_traceability(chain))
            .await
            .unwrap();

        let ids = router.publish_pinned(admit(), Some(&upstream), "node-a").await.unwrap();
        let task = store.get_task(ids[0].as_str()).await.unwrap().unwrap();
        assert_eq!(task.traceability.len(), 1);
        assert!(task.traceability.contains_task(&upstream));
        assert_eq!(task.node_affinity.as_deref(), Some("node-a"));
    }
}
