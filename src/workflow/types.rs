//! Core workflow type definitions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{Step, StepGraph, StepId, StepStatus};
use crate::error::Result;

/// Unique identifier for a workflow instance.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    /// Create a new unique workflow identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WorkflowId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Aggregate status of a workflow, derived from its steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Nothing running and nothing runnable
    #[default]
    Idle,
    /// A step is running or a runnable step is waiting
    Running,
    /// Every step succeeded
    Success,
    /// At least one step failed
    Error,
}

impl WorkflowStatus {
    /// Derive the workflow status from its step statuses.
    ///
    /// `runnable_idle` tells whether some idle step could still be started.
    pub fn derive<I>(statuses: I, runnable_idle: bool) -> Self
    where
        I: IntoIterator<Item = StepStatus>,
    {
        let mut all_success = true;
        let mut any_running = false;
        for status in statuses {
            match status {
                StepStatus::Error => return WorkflowStatus::Error,
                StepStatus::Running => {
                    any_running = true;
                    all_success = false;
                }
                StepStatus::Idle => all_success = false,
                StepStatus::Success => {}
            }
        }
        if all_success {
            WorkflowStatus::Success
        } else if any_running || runnable_idle {
            WorkflowStatus::Running
        } else {
            WorkflowStatus::Idle
        }
    }

    /// Whether the status is `success` or `error`.
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStatus::Success | WorkflowStatus::Error)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Idle => write!(f, "idle"),
            WorkflowStatus::Running => write!(f, "running"),
            WorkflowStatus::Success => write!(f, "success"),
            WorkflowStatus::Error => write!(f, "error"),
        }
    }
}

/// A validated set of steps, ready to be handed to an orchestrator.
///
/// A workflow is built fresh for every user-initiated action and consumed
/// by exactly one orchestrator; retrying means building a new one.
#[derive(Debug)]
pub struct Workflow {
    pub(crate) id: WorkflowId,
    pub(crate) steps: Vec<Step>,
    pub(crate) graph: StepGraph,
}

impl Workflow {
    /// Validate the steps and build the workflow.
    ///
    /// Steps keep their declaration order.
    pub fn new(steps: Vec<Step>) -> Result<Self> {
        let graph = StepGraph::from_steps(&steps)?;
        Ok(Self {
            id: WorkflowId::new(),
            steps,
            graph,
        })
    }

    /// Start a builder for a workflow.
    pub fn builder() -> WorkflowBuilder {
        WorkflowBuilder::default()
    }

    pub fn id(&self) -> WorkflowId {
        self.id
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, id: &StepId) -> Option<&Step> {
        let position = self.graph.position(id)?;
        self.steps.get(position)
    }

    pub fn graph(&self) -> &StepGraph {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Incremental construction of a [`Workflow`].
#[derive(Debug, Default)]
pub struct WorkflowBuilder {
    steps: Vec<Step>,
}

impl WorkflowBuilder {
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn build(self) -> Result<Workflow> {
        Workflow::new(self.steps)
    }
}
