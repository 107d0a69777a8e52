//! Step data model for the destructive-operation DAG.
//!
//! Steps are the atomic units of work in a workflow. Each step owns an
//! asynchronous action, declares the steps it depends on, and tracks its
//! lifecycle through a tagged [`StepState`].

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Identifier for a step, unique within one workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    /// Create a step identifier from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StepId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for StepId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Coarse step status, as shown to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not started yet.
    #[default]
    Idle,
    /// Action in flight.
    Running,
    /// Action resolved successfully.
    Success,
    /// Action failed.
    Error,
}

impl StepStatus {
    /// Whether the status can never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Success | StepStatus::Error)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Idle => write!(f, "idle"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Success => write!(f, "success"),
            StepStatus::Error => write!(f, "error"),
        }
    }
}

/// One sub-item of a fan-out action that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Key of the child item (e.g. the product id).
    pub item: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Outcome annotation for a fan-out action where only some items succeeded.
///
/// Items that succeeded are already committed remotely and are not rolled
/// back; `failed` lists exactly what a caller would need to retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialFailure {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: Vec<ItemFailure>,
}

impl PartialFailure {
    /// Keys of the items that failed, in submission order.
    pub fn failed_items(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.item.as_str()).collect()
    }
}

/// Classification of a step-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorKind {
    /// The action failed as a whole.
    ActionFailed,
    /// A fan-out action failed for a subset of its items.
    PartialActionFailure,
}

/// Error reported by a step action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ActionError {
    /// Human-readable message.
    pub message: String,
    /// Optional machine-readable code (e.g. an HTTP status or `timeout`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Present when a fan-out action partially succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<PartialFailure>,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            partial: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Build the error for a fan-out where `failed` items did not complete.
    pub fn partial(attempted: usize, failed: Vec<ItemFailure>) -> Self {
        let succeeded = attempted.saturating_sub(failed.len());
        let message = format!(
            "{} of {} items failed: {}",
            failed.len(),
            attempted,
            failed
                .iter()
                .map(|f| f.item.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Self {
            message,
            code: Some("partial_failure".to_string()),
            partial: Some(PartialFailure {
                attempted,
                succeeded,
                failed,
            }),
        }
    }

    pub fn kind(&self) -> StepErrorKind {
        if self.partial.is_some() {
            StepErrorKind::PartialActionFailure
        } else {
            StepErrorKind::ActionFailed
        }
    }
}

/// What a step action resolves to.
pub type ActionResult = std::result::Result<Value, ActionError>;

/// An asynchronous, closed-over unit of remote work.
///
/// Any `Fn() -> impl Future<Output = ActionResult>` closure is a
/// `StepAction`, so an HTTP call, an RPC or a local function all qualify.
pub trait StepAction: Send + Sync {
    fn run(&self) -> BoxFuture<'static, ActionResult>;
}

impl<F, Fut> StepAction for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = ActionResult> + Send + 'static,
{
    fn run(&self) -> BoxFuture<'static, ActionResult> {
        Box::pin(self())
    }
}

/// A step definition: id, dependencies and the action to run.
#[derive(Clone)]
pub struct Step {
    pub id: StepId,
    /// Title used by renderers. Defaults to the id.
    pub label: String,
    pub depends_on: Vec<StepId>,
    pub(crate) action: Arc<dyn StepAction>,
}

impl Step {
    /// Create a step with no dependencies from an async closure.
    pub fn new<F, Fut>(id: impl Into<StepId>, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        Self::from_action(id, Arc::new(action))
    }

    /// Create a step from an already shared action.
    pub fn from_action(id: impl Into<StepId>, action: Arc<dyn StepAction>) -> Self {
        let id = id.into();
        Self {
            label: id.to_string(),
            id,
            depends_on: Vec::new(),
            action,
        }
    }

    /// Declare that this step may only start after `dependency` succeeded.
    pub fn depends_on(mut self, dependency: impl Into<StepId>) -> Self {
        let dependency = dependency.into();
        if !self.depends_on.contains(&dependency) {
            self.depends_on.push(dependency);
        }
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("depends_on", &self.depends_on)
            .finish_non_exhaustive()
    }
}

/// Lifecycle of a step. Result and error live in their terminal variants
/// so they can never coexist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum StepState {
    #[default]
    Idle,
    Running,
    Success {
        result: Value,
    },
    Error {
        error: ActionError,
    },
}

impl StepState {
    pub fn status(&self) -> StepStatus {
        match self {
            StepState::Idle => StepStatus::Idle,
            StepState::Running => StepStatus::Running,
            StepState::Success { .. } => StepStatus::Success,
            StepState::Error { .. } => StepStatus::Error,
        }
    }
}

/// Mutable per-step bookkeeping owned by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub id: StepId,
    pub label: String,
    pub state: StepState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepRecord {
    pub fn new(step: &Step) -> Self {
        Self {
            id: step.id.clone(),
            label: step.label.clone(),
            state: StepState::Idle,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn status(&self) -> StepStatus {
        self.state.status()
    }

    /// Transition to Running and record the start time.
    pub fn start(&mut self) {
        self.state = StepState::Running;
        self.started_at = Some(Utc::now());
    }

    /// Record the action's outcome as the terminal state.
    pub fn finish(&mut self, outcome: ActionResult) {
        self.state = match outcome {
            Ok(result) => StepState::Success { result },
            Err(error) => StepState::Error { error },
        };
        self.finished_at = Some(Utc::now());
    }
}
