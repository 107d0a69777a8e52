//! Orchestration layer for destructive-operation workflows.
//!
//! This module drives workflows: the orchestrator schedules steps in
//! dependency order, the runner moves a single step through its state
//! machine, observers receive snapshots, and fan-out helpers turn a list
//! of child deletions into one all-or-nothing step.

mod fanout;
mod observer;
mod orchestrator;
mod runner;

pub use fanout::fan_out;
pub use observer::{ProgressObserver, Subscription, SubscriptionId};
pub use orchestrator::WorkflowOrchestrator;
pub use runner::ABORTED;
