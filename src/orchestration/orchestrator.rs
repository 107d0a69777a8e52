//! Workflow orchestrator.
//!
//! The `WorkflowOrchestrator` owns one [`Workflow`], drives its steps in
//! dependency order and publishes a snapshot after every step transition.
//! All step futures are polled on the task that awaits [`start`], so steps
//! only interleave at their own suspension points; the orchestrator never
//! spawns tasks or threads.
//!
//! [`start`]: WorkflowOrchestrator::start

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{FailurePolicy, OrchestratorConfig};
use crate::core::{StepId, StepStatus};
use crate::error::{Error, Result};
use crate::util::lock;
use crate::workflow::{
    StepSnapshot, Workflow, WorkflowId, WorkflowReport, WorkflowSnapshot, WorkflowState,
    WorkflowStatus,
};

use super::observer::{ObserverRegistry, ProgressObserver, Subscription, SubscriptionId};
use super::runner::StepRunner;

/// Drives a single workflow from idle to a terminal status.
///
/// # Example
///
/// ```ignore
/// use teardown::{Step, Workflow, WorkflowOrchestrator};
///
/// let workflow = Workflow::builder()
///     .step(Step::new("remove_products", || async { Ok(serde_json::Value::Null) }))
///     .step(Step::new("remove_batch", || async { Ok(serde_json::Value::Null) })
///         .depends_on("remove_products"))
///     .build()?;
/// let orchestrator = WorkflowOrchestrator::new(workflow);
/// orchestrator.subscribe(|snapshot: &teardown::WorkflowSnapshot| println!("{:?}", snapshot.status));
/// let report = orchestrator.start().await?;
/// ```
pub struct WorkflowOrchestrator {
    pub(super) workflow: Workflow,
    config: OrchestratorConfig,
    pub(super) state: Mutex<WorkflowState>,
    /// One in-flight flag per step, indexed by declaration position.
    pub(super) in_flight: Vec<AtomicBool>,
    observers: Arc<ObserverRegistry>,
    cancel: CancellationToken,
    started: AtomicBool,
    /// Whether the last published snapshot carried `cancelled`.
    published_cancelled: AtomicBool,
}

impl WorkflowOrchestrator {
    /// Create an orchestrator with the default (sequential, halt on error)
    /// configuration.
    pub fn new(workflow: Workflow) -> Self {
        Self::with_config(workflow, OrchestratorConfig::default())
    }

    pub fn with_config(workflow: Workflow, config: OrchestratorConfig) -> Self {
        let state = WorkflowState::new(workflow.id(), workflow.steps());
        let in_flight = workflow.steps().iter().map(|_| AtomicBool::new(false)).collect();
        Self {
            workflow,
            config,
            state: Mutex::new(state),
            in_flight,
            observers: Arc::new(ObserverRegistry::default()),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            published_cancelled: AtomicBool::new(false),
        }
    }

    pub fn workflow_id(&self) -> WorkflowId {
        self.workflow.id()
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Register an observer called after every step transition.
    pub fn subscribe(&self, observer: impl ProgressObserver + 'static) -> Subscription {
        let id = self.observers.subscribe(Arc::new(observer));
        Subscription::new(id, &self.observers)
    }

    /// Remove an observer. Safe to call from inside an observer callback.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Refuse to start any further step. Steps already running finish and
    /// their outcome is still recorded.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            info!(workflow = %self.workflow_id().short(), "Cancellation requested");
        }
        self.cancel.cancel();
    }

    /// Token that cancels this workflow when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Current view of every step. Never awaits.
    pub fn snapshot(&self) -> WorkflowSnapshot {
        let state = lock(&self.state);
        self.snapshot_of(&state)
    }

    /// Derived workflow status.
    pub fn status(&self) -> WorkflowStatus {
        self.snapshot().status
    }

    /// Run the workflow until it is terminal, or until no step is running
    /// once cancellation or a halting failure stopped new starts.
    ///
    /// When cancellation stopped the run and no published snapshot showed
    /// it yet, the final snapshot is published once more with `cancelled`
    /// set and an unchanged sequence number.
    ///
    /// # Errors
    /// - `AlreadyStarted` if `start` was called before on this orchestrator.
    ///   No step runs and no observer is notified.
    ///
    /// Step failures are not errors of `start`; they are recorded in the
    /// step states and reported through the returned snapshot.
    ///
    /// # Cancel safety
    /// Dropping the returned future (e.g. under `tokio::time::timeout`)
    /// drops every in-flight action. Each of those steps is recorded as
    /// `error` with code `aborted`, since the remote outcome is unknown,
    /// and the terminal snapshot is published before the drop returns.
    pub async fn start(&self) -> Result<WorkflowReport> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyStarted {
                workflow: self.workflow_id(),
            });
        }

        let workflow = self.workflow_id().short();
        info!(
            workflow = %workflow,
            steps = self.workflow.len(),
            max_concurrency = self.config.max_concurrency,
            "Workflow started"
        );

        let runner = StepRunner::new(self);
        let max_concurrency = self.config.max_concurrency.max(1);
        let mut in_flight = FuturesUnordered::new();
        let mut fault: Option<Error> = None;

        loop {
            while fault.is_none() && in_flight.len() < max_concurrency {
                let Some(id) = self.next_runnable() else {
                    break;
                };
                match runner.begin(&id) {
                    Ok(run) => in_flight.push(run),
                    Err(err) => {
                        // The scheduler only picks idle steps with satisfied
                        // dependencies, so this is a bug in the caller of begin.
                        error!(
                            workflow = %workflow,
                            step = %id,
                            error = %err,
                            "Scheduler picked a step it cannot start"
                        );
                        fault = Some(err);
                    }
                }
            }

            let Some(done) = in_flight.next().await else {
                break;
            };
            if done.status == StepStatus::Error && self.config.failure_policy == FailurePolicy::Halt
            {
                debug!(workflow = %workflow, step = %done.id, "Halting after step failure");
            }
        }

        if let Some(err) = fault {
            return Err(err);
        }

        let (snapshot, blocked) = {
            let state = lock(&self.state);
            let blocked: BTreeMap<StepId, Vec<StepId>> = state
                .failed_steps()
                .into_iter()
                .map(|failed| {
                    let dependents: Vec<StepId> = self
                        .workflow
                        .graph()
                        .transitive_dependents(failed)
                        .into_iter()
                        .cloned()
                        .collect();
                    (failed.clone(), dependents)
                })
                .filter(|(_, dependents)| !dependents.is_empty())
                .collect();
            (self.snapshot_of(&state), blocked)
        };
        // A cancel requested from an observer lands after the snapshot it
        // reacted to, so observers would never see the run stop.
        if snapshot.cancelled
            && !snapshot.is_terminal()
            && !self.published_cancelled.load(Ordering::SeqCst)
        {
            self.publish(&snapshot);
        }
        match snapshot.status {
            WorkflowStatus::Success => info!(workflow = %workflow, "Workflow succeeded"),
            WorkflowStatus::Error => {
                let failed: Vec<&str> = snapshot.failed().map(|s| s.id.as_str()).collect();
                let blocked_steps: usize = blocked.values().map(Vec::len).sum();
                warn!(
                    workflow = %workflow,
                    failed = ?failed,
                    blocked = blocked_steps,
                    "Workflow failed"
                );
            }
            status => info!(
                workflow = %workflow,
                status = %status,
                cancelled = snapshot.cancelled,
                "Workflow stopped before completion"
            ),
        }
        Ok(WorkflowReport { snapshot, blocked })
    }

    /// Whether new steps may still be started.
    fn accepting(&self, state: &WorkflowState) -> bool {
        self.is_started()
            && !self.cancel.is_cancelled()
            && !(self.config.failure_policy == FailurePolicy::Halt && state.any_error())
    }

    /// First runnable step in declaration order, if new starts are allowed.
    fn next_runnable(&self) -> Option<StepId> {
        let state = lock(&self.state);
        if !self.accepting(&state) {
            return None;
        }
        self.workflow
            .graph()
            .ready_steps(|id| state.status_of(id))
            .into_iter()
            .next()
            .cloned()
    }

    /// Build a snapshot from a locked state.
    pub(super) fn snapshot_of(&self, state: &WorkflowState) -> WorkflowSnapshot {
        let steps: Vec<StepSnapshot> = state.records().iter().map(StepSnapshot::from).collect();
        let status = if self.is_started() {
            let runnable_idle = self.accepting(state)
                && !self
                    .workflow
                    .graph()
                    .ready_steps(|id| state.status_of(id))
                    .is_empty();
            WorkflowStatus::derive(steps.iter().map(|s| s.status), runnable_idle)
        } else {
            WorkflowStatus::Idle
        };
        WorkflowSnapshot {
            workflow_id: state.workflow_id(),
            status,
            sequence: state.sequence(),
            cancelled: self.cancel.is_cancelled(),
            steps,
        }
    }

    /// Deliver a snapshot to observers. Called without the state lock held.
    pub(super) fn publish(&self, snapshot: &WorkflowSnapshot) {
        self.published_cancelled
            .store(snapshot.cancelled, Ordering::SeqCst);
        self.observers.notify(snapshot);
    }
}

impl std::fmt::Debug for WorkflowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowOrchestrator")
            .field("workflow", &self.workflow_id())
            .field("steps", &self.workflow.len())
            .field("config", &self.config)
            .field("started", &self.is_started())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
