//! Traceability chain - append-only task lineage

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{GrantedStatus, TaskId, now_ms};

/// One step in a task's execution lineage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceabilityElement {
    pub task_id: TaskId,

    /// Participant that executed the step
    pub participant: String,

    /// Short execution summary
    pub summary: String,

    /// How the step ended
    pub outcome: GrantedStatus,

    /// Unix milliseconds
    pub recorded_at: i64,
}

impl TraceabilityElement {
    pub fn new(
        task_id: TaskId,
        participant: impl Into<String>,
        summary: impl Into<String>,
        outcome: GrantedStatus,
    ) -> Self {
        Self {
            task_id,
            participant: participant.into(),
            summary: summary.into(),
            outcome,
            recorded_at: now_ms(),
        }
    }
}

/// Ordered lineage; no two elements share a task id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceabilityChain {
    elements: Vec<TraceabilityElement>,
}

impl TraceabilityChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element unless its task id is already recorded
    ///
    /// Returns true if the element was appended.
    pub fn append_task_journey(&mut self, element: TraceabilityElement) -> bool {
        debug!(task_id = %element.task_id, len = self.elements.len(), "append_task_journey: called");
        if self.contains_task(&element.task_id) {
            debug!(task_id = %element.task_id, "append_task_journey: already recorded, skipping");
            return false;
        }
        self.elements.push(element);
        true
    }

    /// Linear scan for a task id
    pub fn contains_task(&self, task_id: &TaskId) -> bool {
        self.elements.iter().any(|e| &e.task_id == task_id)
    }

    pub fn elements(&self) -> &[TraceabilityElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The most recent step
    pub fn last(&self) -> Option<&TraceabilityElement> {
        self.elements.last()
    }
}
