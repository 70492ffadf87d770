//! ParticipantRegistry implementation

use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{Participant, ParticipantStatus};

/// Errors from registry operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Participant name must not be empty")]
    EmptyName,

    #[error("Participant not found: {0}")]
    NotFound(String),
}

/// Thread-safe participant table keyed by name
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    participants: DashMap<String, Participant>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a participant as idle
    ///
    /// Returns false if the name was already registered; the existing entry
    /// is kept.
    pub fn register(&self, name: &str) -> Result<bool, RegistryError> {
        debug!(%name, "register: called");
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let mut inserted = false;
        self.participants.entry(name.to_string()).or_insert_with(|| {
            inserted = true;
            Participant::new(name)
        });
        if inserted {
            info!(%name, "Participant registered");
        }
        Ok(inserted)
    }

    pub fn deregister(&self, name: &str) -> Option<Participant> {
        debug!(%name, "deregister: called");
        self.participants.remove(name).map(|(_, p)| p)
    }

    pub fn get(&self, name: &str) -> Option<Participant> {
        self.participants.get(name).map(|p| p.value().clone())
    }

    /// Change a participant's status, returning the previous one
    pub fn set_status(&self, name: &str, status: ParticipantStatus) -> Result<ParticipantStatus, RegistryError> {
        debug!(%name, %status, "set_status: called");
        let mut entry = self
            .participants
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        let previous = entry.status;
        entry.status = status;
        Ok(previous)
    }

    /// Snapshot of idle participants, sorted by name
    pub fn idle_participants(&self) -> Vec<Participant> {
        let mut idle: Vec<Participant> = self
            .participants
            .iter()
            .filter(|p| p.is_idle())
            .map(|p| p.value().clone())
            .collect();
        idle.sort_by(|a, b| a.name.cmp(&b.name));
        idle
    }

    /// Snapshot of every participant, sorted by name
    pub fn all(&self) -> Vec<Participant> {
        let mut all: Vec<Participant> = self.participants.iter().map(|p| p.value().clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
