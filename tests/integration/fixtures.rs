//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Recording every published snapshot
//! - Scripted step actions (succeed, fail, sleep, count)
//! - A batch-deletion workflow over the in-memory backend

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

use teardown::memory::MemoryBackend;
use teardown::recipes;
use teardown::{ActionError, ProgressObserver, Step, StepStatus, Workflow, WorkflowSnapshot};

/// Observer that keeps every snapshot it receives.
#[derive(Clone, Default)]
pub struct Recorder {
    snapshots: Arc<Mutex<Vec<WorkflowSnapshot>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<WorkflowSnapshot> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }

    /// Step transitions in publication order, as (step, new status).
    ///
    /// Each snapshot is compared against the previous one; the first is
    /// compared against an all-idle workflow.
    pub fn transitions(&self) -> Vec<(String, StepStatus)> {
        let snapshots = self.snapshots();
        let mut previous: Vec<StepStatus> = Vec::new();
        let mut out = Vec::new();
        for snapshot in &snapshots {
            if previous.len() != snapshot.steps.len() {
                previous = vec![StepStatus::Idle; snapshot.steps.len()];
            }
            for (step, prev) in snapshot.steps.iter().zip(previous.iter_mut()) {
                if step.status != *prev {
                    out.push((step.id.to_string(), step.status));
                    *prev = step.status;
                }
            }
        }
        out
    }

    /// Position of a transition in `transitions()`.
    pub fn position(&self, step: &str, status: StepStatus) -> Option<usize> {
        self.transitions()
            .iter()
            .position(|(id, s)| id == step && *s == status)
    }

    /// Largest number of steps ever observed running at once.
    pub fn max_running(&self) -> usize {
        self.snapshots()
            .iter()
            .map(|s| s.steps.iter().filter(|st| st.status == StepStatus::Running).count())
            .max()
            .unwrap_or(0)
    }
}

impl ProgressObserver for Recorder {
    fn on_snapshot(&self, snapshot: &WorkflowSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }
}

pub fn ok_step(id: &str) -> Step {
    let name = id.to_string();
    Step::new(id, move || {
        let name = name.clone();
        async move { Ok(json!({ "id": name })) }
    })
}

pub fn failing_step(id: &str, message: &'static str) -> Step {
    Step::new(id, move || async move { Err(ActionError::new(message).with_code("500")) })
}

/// A step that succeeds after sleeping.
pub fn slow_step(id: &str, millis: u64) -> Step {
    Step::new(id, move || async move {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(Value::Null)
    })
}

/// A step that counts how often its action was invoked.
pub fn counted_step(id: &str, calls: &Arc<AtomicUsize>) -> Step {
    let calls = Arc::clone(calls);
    Step::new(id, move || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok(Value::Null) }
    })
}

/// A backend holding `batch-1` with the given products.
pub fn batch_backend(products: &[&str]) -> MemoryBackend {
    let backend = MemoryBackend::new();
    backend.insert_parent("batch-1", products.iter().copied());
    backend
}

/// Cascade deletion of `batch-1` against `backend`.
pub fn batch_deletion(backend: &MemoryBackend) -> Workflow {
    let products = backend.children("batch-1");
    let (children, parent) = (backend.clone(), backend.clone());
    recipes::cascade_delete(
        "batch-1",
        products,
        move |product| {
            let backend = children.clone();
            async move { backend.delete_child(product).await }
        },
        move |batch| {
            let backend = parent.clone();
            async move { backend.delete_parent(batch).await }
        },
    )
    .unwrap()
}
