//! Immutable views of a workflow handed to observers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{ActionError, StepId, StepRecord, StepState, StepStatus};

use super::{WorkflowId, WorkflowStatus};

/// One step as seen by an observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub id: StepId,
    pub label: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ActionError>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&StepRecord> for StepSnapshot {
    fn from(record: &StepRecord) -> Self {
        let (result, error) = match &record.state {
            StepState::Success { result } => (Some(result.clone()), None),
            StepState::Error { error } => (None, Some(error.clone())),
            StepState::Idle | StepState::Running => (None, None),
        };
        Self {
            id: record.id.clone(),
            label: record.label.clone(),
            status: record.status(),
            result,
            error,
            started_at: record.started_at,
            finished_at: record.finished_at,
        }
    }
}

/// Point-in-time view of every step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub workflow_id: WorkflowId,
    pub status: WorkflowStatus,
    /// Number of transitions published before this snapshot was taken.
    pub sequence: u64,
    pub cancelled: bool,
    /// Steps in declaration order.
    pub steps: Vec<StepSnapshot>,
}

impl WorkflowSnapshot {
    pub fn step(&self, id: &str) -> Option<&StepSnapshot> {
        self.steps.iter().find(|s| s.id.as_str() == id)
    }

    /// Status of a step; unknown ids read as idle.
    pub fn status_of(&self, id: &str) -> StepStatus {
        self.step(id).map(|s| s.status).unwrap_or_default()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Steps that ended in error.
    pub fn failed(&self) -> impl Iterator<Item = &StepSnapshot> {
        self.steps.iter().filter(|s| s.status == StepStatus::Error)
    }

    /// Number of steps that reached success.
    pub fn completed_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Success)
            .count()
    }
}

/// Final outcome of [`WorkflowOrchestrator::start`](crate::WorkflowOrchestrator::start).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub snapshot: WorkflowSnapshot,
    /// Failed step -> steps that can never run because of it, in
    /// declaration order.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub blocked: BTreeMap<StepId, Vec<StepId>>,
}

impl WorkflowReport {
    /// Steps left idle because `failed` did not succeed.
    pub fn blocked_by(&self, failed: &str) -> &[StepId] {
        self.blocked
            .get(&StepId::from(failed))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn status(&self) -> WorkflowStatus {
        self.snapshot.status
    }

    pub fn cancelled(&self) -> bool {
        self.snapshot.cancelled
    }

    pub fn is_success(&self) -> bool {
        self.snapshot.status == WorkflowStatus::Success
    }
}
