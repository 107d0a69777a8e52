//! Single-step execution.
//!
//! `StepRunner` moves one step through idle -> running -> success | error.
//! Starting is synchronous: every precondition is checked and the running
//! transition is published before the caller receives the future that
//! drives the action. The future then records the terminal transition.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::core::{ActionError, ActionResult, StepId, StepStatus};
use crate::error::{Error, Result};
use crate::util::lock;

use super::orchestrator::WorkflowOrchestrator;

/// Error code of a step whose completion future was dropped mid-run.
pub const ABORTED: &str = "aborted";

/// Terminal outcome of one step run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StepCompletion {
    pub id: StepId,
    pub status: StepStatus,
}

#[derive(Clone, Copy)]
pub(crate) struct StepRunner<'a> {
    orchestrator: &'a WorkflowOrchestrator,
}

impl<'a> StepRunner<'a> {
    pub(crate) fn new(orchestrator: &'a WorkflowOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Start a step and return the future that completes it.
    ///
    /// # Errors
    /// - `StepNotFound` for an id outside the workflow
    /// - `StepAlreadyRunning` while the step's in-flight flag is set
    /// - `StepFinished` if the step already reached a terminal state
    /// - `DependencyUnmet` if a dependency has not succeeded
    ///
    /// On error nothing changes and no observer is notified.
    pub(crate) fn begin(&self, id: &StepId) -> Result<impl Future<Output = StepCompletion> + 'a> {
        let orchestrator = self.orchestrator;
        let workflow = &orchestrator.workflow;
        let position = workflow
            .graph()
            .position(id)
            .ok_or_else(|| Error::StepNotFound(id.clone()))?;
        let step = &workflow.steps()[position];
        let flag = &orchestrator.in_flight[position];

        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::StepAlreadyRunning(id.clone()));
        }

        let started = {
            let mut state = lock(&orchestrator.state);
            let checked = state.can_begin(id).and_then(|()| {
                match workflow
                    .graph()
                    .unmet_dependency(id, |dep| state.status_of(dep))
                {
                    Some(dependency) => Err(Error::DependencyUnmet {
                        step: id.clone(),
                        dependency: dependency.clone(),
                    }),
                    None => Ok(()),
                }
            });
            checked
                .and_then(|()| state.begin(id))
                .map(|_| orchestrator.snapshot_of(&state))
        };
        let snapshot = match started {
            Ok(snapshot) => snapshot,
            Err(err) => {
                flag.store(false, Ordering::SeqCst);
                return Err(err);
            }
        };

        debug!(
            workflow = %snapshot.workflow_id.short(),
            step = %id,
            sequence = snapshot.sequence,
            "Step running"
        );
        orchestrator.publish(&snapshot);

        let action = step.action.run();
        let mut completion = Completion {
            orchestrator,
            id: id.clone(),
            flag,
            recorded: false,
        };
        Ok(async move {
            let outcome = action.await;
            if let Err(err) = &outcome {
                warn!(step = %completion.id, error = %err, kind = ?err.kind(), "Step failed");
            }
            let status = completion.record(outcome);
            StepCompletion {
                id: completion.id.clone(),
                status,
            }
        })
    }
}

/// Records the terminal transition of one running step.
///
/// Owned by the completion future. If that future is dropped before the
/// action resolved, the step is recorded as `error` with code `aborted`
/// so it never stays `running`.
struct Completion<'a> {
    orchestrator: &'a WorkflowOrchestrator,
    id: StepId,
    flag: &'a AtomicBool,
    recorded: bool,
}

impl Completion<'_> {
    fn record(&mut self, outcome: ActionResult) -> StepStatus {
        self.recorded = true;
        let orchestrator = self.orchestrator;
        let id = &self.id;

        let finished = {
            let mut state = lock(&orchestrator.state);
            state
                .finish(id, outcome)
                .map(|_| (state.status_of(id), orchestrator.snapshot_of(&state)))
        };
        self.flag.store(false, Ordering::SeqCst);

        match finished {
            Ok((status, snapshot)) => {
                debug!(
                    workflow = %snapshot.workflow_id.short(),
                    step = %id,
                    status = %status,
                    sequence = snapshot.sequence,
                    "Step finished"
                );
                orchestrator.publish(&snapshot);
                status
            }
            Err(err) => {
                // Only the completion moves the step out of running.
                warn!(step = %id, error = %err, "Could not record step outcome");
                lock(&orchestrator.state).status_of(id)
            }
        }
    }
}

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        if self.recorded {
            return;
        }
        warn!(step = %self.id, "Step dropped while running, outcome unknown");
        let error = ActionError::new("dropped while running, remote outcome unknown");
        self.record(Err(error.with_code(ABORTED)));
    }
}
