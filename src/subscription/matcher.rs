//! Resolves recipients for published manifests

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{DataParcelManifest, ManifestCriteria, Participant};
use crate::forward::SubscriptionReport;
use crate::registry::ParticipantRegistry;

use super::map::SubscriptionMap;

/// Errors from subscription operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Participant name must not be empty")]
    EmptyParticipant,
}

/// Matches manifests against the subscription map
pub struct SubscriptionMatcher {
    map: Arc<SubscriptionMap>,
    registry: Arc<ParticipantRegistry>,
}

impl SubscriptionMatcher {
    pub fn new(map: Arc<SubscriptionMap>, registry: Arc<ParticipantRegistry>) -> Self {
        Self { map, registry }
    }

    /// Names of the participants that should receive a manifest
    ///
    /// An intended target restricts the result to that name, and only if
    /// the target itself is interested.
    pub fn subscriber_set(&self, manifest: &DataParcelManifest) -> Result<BTreeSet<String>, SubscriptionError> {
        debug!(category = %manifest.category, data_type = %manifest.data_type, target = ?manifest.intended_target, "subscriber_set: called");
        check_manifest(manifest)?;

        let mut names = self.map.matching_names(manifest);
        if let Some(target) = &manifest.intended_target {
            names.retain(|n| n == target);
        }
        debug!(count = names.len(), "subscriber_set: resolved");
        Ok(names)
    }

    /// Registered participants that should receive a manifest
    pub fn subscribers(&self, manifest: &DataParcelManifest) -> Result<Vec<Participant>, SubscriptionError> {
        Ok(self
            .subscriber_set(manifest)?
            .iter()
            .filter_map(|name| self.registry.get(name))
            .collect())
    }

    pub fn has_at_least_one_subscriber(&self, manifest: &DataParcelManifest) -> Result<bool, SubscriptionError> {
        Ok(!self.subscriber_set(manifest)?.is_empty())
    }

    /// Declare interest; returns whether the registration was new
    pub fn add_topic_subscriber(&self, criteria: ManifestCriteria, participant: &str) -> Result<bool, SubscriptionError> {
        if participant.is_empty() {
            return Err(SubscriptionError::EmptyParticipant);
        }
        let added = self.map.add(criteria.clone(), participant);
        if added {
            info!(%criteria, %participant, "Subscription added");
        }
        Ok(added)
    }

    pub fn remove_topic_subscriber(&self, criteria: &ManifestCriteria, participant: &str) -> bool {
        self.map.remove(criteria, participant)
    }

    /// Drop a participant from every subscription
    pub fn remove_participant(&self, participant: &str) -> usize {
        let removed = self.map.remove_participant(participant);
        info!(%participant, %removed, "Participant unsubscribed");
        removed
    }

    /// Current subscriptions of one participant
    pub fn subscription_report(&self, participant: &str) -> SubscriptionReport {
        SubscriptionReport::new(participant, self.map.criteria_for(participant))
    }
}

fn check_manifest(manifest: &DataParcelManifest) -> Result<(), SubscriptionError> {
    if manifest.is_well_formed() {
        Ok(())
    } else {
        Err(SubscriptionError::InvalidManifest(format!(
            "category '{}' / data type '{}'",
            manifest.category, manifest.data_type
        )))
    }
}
