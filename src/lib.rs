//! Orchestration of multi-step destructive operations.
//!
//! A [`Workflow`] is a small DAG of [`Step`]s, each wrapping one remote
//! mutation. The [`WorkflowOrchestrator`] runs the steps in dependency
//! order, never starts a step whose dependency failed, and publishes a
//! [`WorkflowSnapshot`] to every [`ProgressObserver`] after each transition.

pub mod config;
pub mod core;
pub mod error;
pub mod memory;
pub mod orchestration;
pub mod recipes;
pub mod render;
pub mod util;
pub mod workflow;

pub use config::{FailurePolicy, OrchestratorConfig};
pub use core::{
    ActionError, ActionResult, ItemFailure, PartialFailure, Step, StepAction, StepErrorKind,
    StepId, StepStatus,
};
pub use error::{Error, Result};
pub use orchestration::{
    fan_out, ProgressObserver, Subscription, SubscriptionId, WorkflowOrchestrator, ABORTED,
};
pub use render::TimelineObserver;
pub use util::with_timeout;
pub use workflow::{
    StepSnapshot, Workflow, WorkflowBuilder, WorkflowId, WorkflowReport, WorkflowSnapshot,
    WorkflowStatus,
};
