//! Criteria to participant-name table

use std::collections::{BTreeSet, HashSet};

use dashmap::DashMap;
use tracing::debug;

use crate::domain::{DataParcelManifest, ManifestCriteria};

/// Interest sets keyed by criteria
#[derive(Debug, Default)]
pub struct SubscriptionMap {
    entries: DashMap<ManifestCriteria, HashSet<String>>,
}

impl SubscriptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant under a criteria; returns whether it was new
    pub fn add(&self, criteria: ManifestCriteria, participant: &str) -> bool {
        debug!(%criteria, %participant, "SubscriptionMap::add: called");
        self.entries.entry(criteria).or_default().insert(participant.to_string())
    }

    /// Remove a participant from one criteria; returns whether it was present
    pub fn remove(&self, criteria: &ManifestCriteria, participant: &str) -> bool {
        debug!(%criteria, %participant, "SubscriptionMap::remove: called");
        let removed = self
            .entries
            .get_mut(criteria)
            .is_some_and(|mut names| names.remove(participant));
        self.entries.remove_if(criteria, |_, names| names.is_empty());
        removed
    }

    /// Remove a participant from every criteria; returns how many entries dropped it
    pub fn remove_participant(&self, participant: &str) -> usize {
        debug!(%participant, "SubscriptionMap::remove_participant: called");
        let mut count = 0;
        for mut entry in self.entries.iter_mut() {
            if entry.value_mut().remove(participant) {
                count += 1;
            }
        }
        self.entries.retain(|_, names| !names.is_empty());
        count
    }

    /// Names interested in a manifest through any matching criteria
    pub fn matching_names(&self, manifest: &DataParcelManifest) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter(|e| e.key().matches(manifest))
            .flat_map(|e| e.value().iter().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// Every criteria a participant is registered under, sorted
    pub fn criteria_for(&self, participant: &str) -> Vec<ManifestCriteria> {
        let mut criteria: Vec<ManifestCriteria> = self
            .entries
            .iter()
            .filter(|e| e.value().contains(participant))
            .map(|e| e.key().clone())
            .collect();
        criteria.sort();
        criteria
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
