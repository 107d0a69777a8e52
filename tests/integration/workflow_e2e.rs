//! End-to-end workflow tests.
//!
//! Batch deletion against the in-memory backend, plus the ordering and
//! failure guarantees every workflow shape relies on.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use teardown::recipes::{REMOVE_CHILDREN, REMOVE_PARENT};
use teardown::{
    with_timeout, Error, Step, StepErrorKind, StepStatus, TimelineObserver, Workflow,
    WorkflowOrchestrator, WorkflowStatus,
};

use crate::fixtures::{
    batch_backend, batch_deletion, counted_step, failing_step, ok_step, Recorder,
};

/// Scenario: batch with two products, all deletions succeed.
#[tokio::test]
async fn test_batch_deletion_all_succeed() {
    let backend = batch_backend(&["product-1", "product-2"]);
    let orchestrator = WorkflowOrchestrator::new(batch_deletion(&backend));
    let recorder = Recorder::new();
    orchestrator.subscribe(recorder.clone());

    let report = orchestrator.start().await.unwrap();

    assert_eq!(report.status(), WorkflowStatus::Success);
    assert_eq!(report.snapshot.status_of(REMOVE_CHILDREN), StepStatus::Success);
    assert_eq!(report.snapshot.status_of(REMOVE_PARENT), StepStatus::Success);
    assert!(!backend.has_parent("batch-1"));
    // Two product calls and one batch call.
    assert_eq!(backend.calls(), 3);
    assert_eq!(
        recorder.transitions(),
        vec![
            (REMOVE_CHILDREN.to_string(), StepStatus::Running),
            (REMOVE_CHILDREN.to_string(), StepStatus::Success),
            (REMOVE_PARENT.to_string(), StepStatus::Running),
            (REMOVE_PARENT.to_string(), StepStatus::Success),
        ]
    );
    assert!(recorder.snapshots().last().unwrap().is_terminal());
}

/// Scenario: one of two product deletions fails.
#[tokio::test]
async fn test_batch_deletion_child_failure_keeps_batch() {
    let backend = batch_backend(&["product-1", "product-2"]);
    backend.fail_on("product-2");
    let orchestrator = WorkflowOrchestrator::new(batch_deletion(&backend));
    let recorder = Recorder::new();
    orchestrator.subscribe(recorder.clone());

    let report = orchestrator.start().await.unwrap();

    assert_eq!(report.status(), WorkflowStatus::Error);
    assert_eq!(report.snapshot.status_of(REMOVE_PARENT), StepStatus::Idle);
    assert!(backend.has_parent("batch-1"));
    // product-1 is gone and not restored.
    assert_eq!(backend.children("batch-1"), vec!["product-2"]);

    let error = report
        .snapshot
        .step(REMOVE_CHILDREN)
        .and_then(|s| s.error.clone())
        .unwrap();
    assert_eq!(error.kind(), StepErrorKind::PartialActionFailure);
    assert!(error.message.contains("product-2"));
    let partial = error.partial.unwrap();
    assert_eq!(partial.failed_items(), vec!["product-2"]);
    assert_eq!(partial.succeeded, 1);

    assert_eq!(recorder.position(REMOVE_PARENT, StepStatus::Running), None);
}

/// Scenario: batch without products.
#[tokio::test]
async fn test_batch_deletion_without_products() {
    let backend = batch_backend(&[]);
    let orchestrator = WorkflowOrchestrator::new(batch_deletion(&backend));
    let recorder = Recorder::new();
    orchestrator.subscribe(recorder.clone());

    let report = orchestrator.start().await.unwrap();

    assert!(report.is_success());
    // Only the batch itself was deleted remotely.
    assert_eq!(backend.calls(), 1);
    let children = report.snapshot.step(REMOVE_CHILDREN).unwrap();
    assert_eq!(children.result.as_ref().unwrap()["attempted"], 0);
    assert_eq!(
        recorder.transitions()[..2],
        [
            (REMOVE_CHILDREN.to_string(), StepStatus::Running),
            (REMOVE_CHILDREN.to_string(), StepStatus::Success),
        ]
    );
}

#[tokio::test]
async fn test_dependency_terminal_published_before_dependent_runs() {
    let workflow = Workflow::builder()
        // Declared first, depends on a later step.
        .step(ok_step("b").depends_on("a"))
        .step(ok_step("a"))
        .build()
        .unwrap();
    let orchestrator = WorkflowOrchestrator::new(workflow);
    let recorder = Recorder::new();
    orchestrator.subscribe(recorder.clone());

    orchestrator.start().await.unwrap();

    let a_done = recorder.position("a", StepStatus::Success).unwrap();
    let b_running = recorder.position("b", StepStatus::Running).unwrap();
    assert!(a_done < b_running);
}

#[tokio::test]
async fn test_chain_failure_never_starts_dependents() {
    let calls = Arc::new(AtomicUsize::new(0));
    let workflow = Workflow::builder()
        .step(failing_step("a", "HTTP 500"))
        .step(counted_step("b", &calls).depends_on("a"))
        .step(counted_step("c", &calls).depends_on("b"))
        .build()
        .unwrap();
    let orchestrator = WorkflowOrchestrator::new(workflow);
    let recorder = Recorder::new();
    orchestrator.subscribe(recorder.clone());

    let report = orchestrator.start().await.unwrap();

    assert_eq!(report.status(), WorkflowStatus::Error);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    for snapshot in recorder.snapshots() {
        assert_eq!(snapshot.status_of("b"), StepStatus::Idle);
        assert_eq!(snapshot.status_of("c"), StepStatus::Idle);
    }
    let failed: Vec<&str> = report.snapshot.failed().map(|s| s.id.as_str()).collect();
    assert_eq!(failed, vec!["a"]);
    let blocked: Vec<&str> = report.blocked_by("a").iter().map(|id| id.as_str()).collect();
    assert_eq!(blocked, vec!["b", "c"]);
}

#[tokio::test]
async fn test_restart_after_terminal_is_rejected() {
    let backend = batch_backend(&["product-1"]);
    let orchestrator = WorkflowOrchestrator::new(batch_deletion(&backend));
    let recorder = Recorder::new();
    orchestrator.subscribe(recorder.clone());

    orchestrator.start().await.unwrap();
    let published = recorder.count();
    let calls = backend.calls();

    let err = orchestrator.start().await.unwrap_err();
    assert!(matches!(err, Error::AlreadyStarted { .. }));
    assert_eq!(recorder.count(), published);
    assert_eq!(backend.calls(), calls);
}

#[tokio::test]
async fn test_sequence_increases_by_one_per_transition() {
    let backend = batch_backend(&["product-1", "product-2"]);
    let orchestrator = WorkflowOrchestrator::new(batch_deletion(&backend));
    let recorder = Recorder::new();
    orchestrator.subscribe(recorder.clone());

    orchestrator.start().await.unwrap();

    let sequences: Vec<u64> = recorder.snapshots().iter().map(|s| s.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_step_timeout_is_a_step_error() {
    let workflow = Workflow::new(vec![Step::new("remove_batch", || {
        with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(serde_json::Value::Null)
        })
    })])
    .unwrap();

    let report = WorkflowOrchestrator::new(workflow).start().await.unwrap();

    let error = report.snapshot.step("remove_batch").unwrap().error.clone().unwrap();
    assert_eq!(error.code.as_deref(), Some("timeout"));
    assert_eq!(report.status(), WorkflowStatus::Error);
}

#[test]
fn test_invalid_graphs_are_rejected() {
    let cycle = Workflow::builder()
        .step(ok_step("a").depends_on("b"))
        .step(ok_step("b").depends_on("a"))
        .build();
    assert!(matches!(cycle, Err(Error::DependencyCycle(_))));

    let unknown = Workflow::builder().step(ok_step("a").depends_on("ghost")).build();
    assert!(matches!(unknown, Err(Error::UnknownDependency { .. })));

    let duplicate = Workflow::builder().step(ok_step("a")).step(ok_step("a")).build();
    assert!(matches!(duplicate, Err(Error::DuplicateStep(_))));
}

#[tokio::test]
async fn test_timeline_observer_renders_run() {
    let backend = batch_backend(&["product-1"]);
    backend.fail_on("batch-1");
    let orchestrator = WorkflowOrchestrator::new(batch_deletion(&backend));
    let timeline = Arc::new(TimelineObserver::new(Vec::new()));
    let sink = Arc::clone(&timeline);
    orchestrator.subscribe(move |snapshot: &teardown::WorkflowSnapshot| {
        teardown::ProgressObserver::on_snapshot(sink.as_ref(), snapshot)
    });

    orchestrator.start().await.unwrap();
    drop(orchestrator);

    let timeline = Arc::try_unwrap(timeline).ok().unwrap();
    let text = String::from_utf8(timeline.into_inner()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].ends_with("in progress"));
    assert!(lines[1].ends_with("done (1 items)"));
    assert!(lines[3].contains("failed: HTTP error deleting batch-1 (500)"));
    assert_eq!(lines[4], "#4 [!] aborted");
}
