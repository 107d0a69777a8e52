//! Workflow types for the destructive-operation orchestrator.
//!
//! This module provides the validated step set handed to an orchestrator,
//! the step table that enforces the step state machine, and the snapshots
//! published to observers.

mod snapshot;
mod state;
mod types;

pub use snapshot::{StepSnapshot, WorkflowReport, WorkflowSnapshot};
pub use state::WorkflowState;
pub use types::{Workflow, WorkflowBuilder, WorkflowId, WorkflowStatus};
