//! Step table with transition validation.
//!
//! `WorkflowState` holds one [`StepRecord`] per step and enforces the step
//! state machine:
//!
//! idle -> running -> success | error
//!
//! Terminal states never change again, and a running step cannot be
//! started twice.

use std::collections::HashMap;

use crate::core::{ActionResult, Step, StepId, StepRecord, StepStatus};
use crate::error::{Error, Result};

use super::WorkflowId;

#[derive(Debug, Clone)]
pub struct WorkflowState {
    workflow_id: WorkflowId,
    records: Vec<StepRecord>,
    positions: HashMap<StepId, usize>,
    /// Bumped once per published transition.
    sequence: u64,
}

impl WorkflowState {
    /// Create the table with every step idle.
    pub fn new(workflow_id: WorkflowId, steps: &[Step]) -> Self {
        let records: Vec<StepRecord> = steps.iter().map(StepRecord::new).collect();
        let positions = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();
        Self {
            workflow_id,
            records,
            positions,
            sequence: 0,
        }
    }

    pub fn workflow_id(&self) -> WorkflowId {
        self.workflow_id
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn record(&self, id: &StepId) -> Option<&StepRecord> {
        self.positions.get(id).map(|&i| &self.records[i])
    }

    /// Status of a step; unknown ids read as idle.
    pub fn status_of(&self, id: &StepId) -> StepStatus {
        self.record(id).map(StepRecord::status).unwrap_or_default()
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn any_error(&self) -> bool {
        self.records
            .iter()
            .any(|r| r.status() == StepStatus::Error)
    }

    /// Ids of steps that ended in error, in declaration order.
    pub fn failed_steps(&self) -> Vec<&StepId> {
        self.records
            .iter()
            .filter(|r| r.status() == StepStatus::Error)
            .map(|r| &r.id)
            .collect()
    }

    /// Check whether `id` may move from idle to running.
    pub fn can_begin(&self, id: &StepId) -> Result<()> {
        let record = self
            .record(id)
            .ok_or_else(|| Error::StepNotFound(id.clone()))?;
        match record.status() {
            StepStatus::Idle => Ok(()),
            StepStatus::Running => Err(Error::StepAlreadyRunning(id.clone())),
            StepStatus::Success | StepStatus::Error => Err(Error::StepFinished(id.clone())),
        }
    }

    /// Move a step from idle to running.
    pub fn begin(&mut self, id: &StepId) -> Result<u64> {
        self.can_begin(id)?;
        let position = self.positions[id];
        self.records[position].start();
        Ok(self.bump())
    }

    /// Record the terminal outcome of a running step.
    pub fn finish(&mut self, id: &StepId, outcome: ActionResult) -> Result<u64> {
        let position = *self
            .positions
            .get(id)
            .ok_or_else(|| Error::StepNotFound(id.clone()))?;
        let record = &mut self.records[position];
        match record.status() {
            StepStatus::Running => {
                record.finish(outcome);
                Ok(self.bump())
            }
            StepStatus::Idle => Err(Error::Validation(format!(
                "Step {} finished without being started",
                id
            ))),
            StepStatus::Success | StepStatus::Error => Err(Error::StepFinished(id.clone())),
        }
    }

    fn bump(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }
}
