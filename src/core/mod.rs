//! Core domain models for destructive-operation workflows.
//!
//! This module contains the fundamental data structures used throughout
//! the orchestrator: steps, their state machine, and the dependency graph.

pub mod graph;
pub mod step;

pub use graph::StepGraph;
pub use step::{
    ActionError, ActionResult, ItemFailure, PartialFailure, Step, StepAction, StepErrorKind,
    StepId, StepRecord, StepState, StepStatus,
};
