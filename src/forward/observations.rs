//! Observation records carried by the forward queues

use serde::{Deserialize, Serialize};

use crate::domain::{GrantedStatus, ManifestCriteria, Participant, TaskId, now_ms};

/// Durable record of one concluded execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub task_id: TaskId,
    pub participant: String,
    pub process_id: String,
    pub outcome: GrantedStatus,
    pub summary: String,
    pub recorded_at: i64,
}

impl AuditRecord {
    pub fn new(
        task_id: TaskId,
        participant: impl Into<String>,
        process_id: impl Into<String>,
        outcome: GrantedStatus,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            participant: participant.into(),
            process_id: process_id.into(),
            outcome,
            summary: summary.into(),
            recorded_at: now_ms(),
        }
    }
}

/// A single measured value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub name: String,
    pub value: f64,
    pub unit: String,
    #[serde(default)]
    pub participant: Option<String>,
    pub recorded_at: i64,
}

impl MetricRecord {
    pub fn new(name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            unit: unit.into(),
            participant: None,
            recorded_at: now_ms(),
        }
    }

    pub fn for_participant(mut self, participant: impl Into<String>) -> Self {
        self.participant = Some(participant.into());
        self
    }
}

/// Participants known to one process at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub process_id: String,
    pub participants: Vec<Participant>,
    pub taken_at: i64,
}

impl TopologySnapshot {
    pub fn new(process_id: impl Into<String>, participants: Vec<Participant>) -> Self {
        Self {
            process_id: process_id.into(),
            participants,
            taken_at: now_ms(),
        }
    }
}

/// Criteria a participant is subscribed to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionReport {
    pub participant: String,
    pub criteria: Vec<ManifestCriteria>,
    pub reported_at: i64,
}

impl SubscriptionReport {
    pub fn new(participant: impl Into<String>, criteria: Vec<ManifestCriteria>) -> Self {
        Self {
            participant: participant.into(),
            criteria,
            reported_at: now_ms(),
        }
    }
}
