//! Cancellation and observer lifecycle tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use teardown::recipes::{REMOVE_CHILDREN, REMOVE_PARENT};
use teardown::{
    Error, OrchestratorConfig, ProgressObserver, StepStatus, Subscription, TimelineObserver,
    Workflow, WorkflowOrchestrator, WorkflowSnapshot, WorkflowStatus, ABORTED,
};

use crate::fixtures::{batch_backend, batch_deletion, ok_step, slow_step, Recorder};

/// Test: cancel after the products are deleted
/// Given a batch deletion
/// When cancellation is requested once the products step succeeded
/// Then the batch step never starts and the batch survives
#[tokio::test]
async fn test_cancel_after_children_leaves_parent_idle() {
    let backend = batch_backend(&["product-1", "product-2"]);
    let orchestrator = WorkflowOrchestrator::new(batch_deletion(&backend));
    let token = orchestrator.cancellation_token();
    orchestrator.subscribe(move |snapshot: &WorkflowSnapshot| {
        if snapshot.status_of(REMOVE_CHILDREN) == StepStatus::Success {
            token.cancel();
        }
    });
    let recorder = Recorder::new();
    orchestrator.subscribe(recorder.clone());

    let report = orchestrator.start().await.unwrap();

    assert!(report.cancelled());
    assert!(orchestrator.is_cancelled());
    assert_eq!(report.snapshot.status_of(REMOVE_CHILDREN), StepStatus::Success);
    assert_eq!(report.snapshot.status_of(REMOVE_PARENT), StepStatus::Idle);
    assert_eq!(report.status(), WorkflowStatus::Idle);
    assert!(backend.has_parent("batch-1"));
    assert!(backend.children("batch-1").is_empty());
    assert_eq!(recorder.position(REMOVE_PARENT, StepStatus::Running), None);
}

/// Test: the timeline shows a cancelled run as stopped
/// Given a batch deletion writing to a timeline
/// When an observer cancels once the products step succeeded
/// Then the timeline ends with the cancelled marker
#[tokio::test]
async fn test_timeline_marks_cancelled_run() {
    let backend = batch_backend(&["product-1", "product-2"]);
    let orchestrator = WorkflowOrchestrator::new(batch_deletion(&backend));
    let timeline = Arc::new(TimelineObserver::new(Vec::new()));
    let sink = Arc::clone(&timeline);
    orchestrator.subscribe(move |snapshot: &WorkflowSnapshot| sink.on_snapshot(snapshot));
    let token = orchestrator.cancellation_token();
    orchestrator.subscribe(move |snapshot: &WorkflowSnapshot| {
        if snapshot.status_of(REMOVE_CHILDREN) == StepStatus::Success {
            token.cancel();
        }
    });

    let report = orchestrator.start().await.unwrap();
    drop(orchestrator);

    assert!(report.cancelled());
    let timeline = Arc::try_unwrap(timeline).ok().unwrap();
    let text = String::from_utf8(timeline.into_inner()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].ends_with("done (2 items)"));
    assert_eq!(lines[2], "#2 [-] cancelled");
}

/// Test: abandoning start() mid-step does not wedge the workflow
/// Given a slow step with a dependent
/// When the caller drops start() after 20ms
/// Then the slow step is recorded as aborted, observers see it, the
/// dependent never runs and a second start is rejected
#[tokio::test]
async fn test_dropping_start_mid_step_records_aborted() {
    let workflow = Workflow::builder()
        .step(slow_step("a", 200))
        .step(ok_step("b").depends_on("a"))
        .build()
        .unwrap();
    let orchestrator = WorkflowOrchestrator::new(workflow);
    let recorder = Recorder::new();
    orchestrator.subscribe(recorder.clone());

    let abandoned = tokio::time::timeout(Duration::from_millis(20), orchestrator.start()).await;
    assert!(abandoned.is_err());

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.status, WorkflowStatus::Error);
    assert_eq!(snapshot.status_of("b"), StepStatus::Idle);
    let a = snapshot.step("a").unwrap();
    assert_eq!(a.status, StepStatus::Error);
    assert_eq!(a.error.as_ref().unwrap().code.as_deref(), Some(ABORTED));
    assert_eq!(
        recorder.transitions(),
        vec![
            ("a".to_string(), StepStatus::Running),
            ("a".to_string(), StepStatus::Error),
        ]
    );

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(orchestrator.snapshot().sequence, snapshot.sequence);
    assert!(matches!(orchestrator.start().await, Err(Error::AlreadyStarted { .. })));
    assert_eq!(recorder.count(), 2);
}

/// Test: in-flight steps finish after cancellation
/// Given two running steps
/// When one of them finishes and cancels the workflow
/// Then the other still runs to completion and is recorded
#[tokio::test]
async fn test_cancel_lets_running_steps_finish() {
    let workflow = Workflow::builder()
        .step(slow_step("slow", 30))
        .step(ok_step("fast"))
        .step(ok_step("never"))
        .build()
        .unwrap();
    let config = OrchestratorConfig::default().with_max_concurrency(2);
    let orchestrator = WorkflowOrchestrator::with_config(workflow, config);
    let token = orchestrator.cancellation_token();
    orchestrator.subscribe(move |snapshot: &WorkflowSnapshot| {
        if snapshot.status_of("fast") == StepStatus::Success {
            token.cancel();
        }
    });

    let report = orchestrator.start().await.unwrap();

    assert!(report.cancelled());
    assert_eq!(report.snapshot.status_of("slow"), StepStatus::Success);
    assert_eq!(report.snapshot.status_of("never"), StepStatus::Idle);
    assert!(report.snapshot.steps.iter().all(|s| s.status != StepStatus::Running));
}

/// Test: snapshot can be read while a step is running
#[tokio::test]
async fn test_snapshot_during_execution() {
    let workflow = Workflow::new(vec![slow_step("remove_batch", 30)]).unwrap();
    let orchestrator = WorkflowOrchestrator::new(workflow);

    let (report, mid) = tokio::join!(orchestrator.start(), async {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        orchestrator.snapshot()
    });

    assert_eq!(mid.status, WorkflowStatus::Running);
    assert_eq!(mid.status_of("remove_batch"), StepStatus::Running);
    assert!(report.unwrap().is_success());
}

/// Test: an observer may read the orchestrator from inside its callback
#[tokio::test]
async fn test_observer_reads_snapshot_reentrantly() {
    let orchestrator = Arc::new(WorkflowOrchestrator::new(
        Workflow::builder()
            .step(ok_step("a"))
            .step(ok_step("b").depends_on("a"))
            .build()
            .unwrap(),
    ));
    let weak = Arc::downgrade(&orchestrator);
    let sequences = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&sequences);
    orchestrator.subscribe(move |snapshot: &WorkflowSnapshot| {
        if let Some(orchestrator) = weak.upgrade() {
            assert_eq!(orchestrator.snapshot().sequence, snapshot.sequence);
            sink.lock().unwrap().push(snapshot.sequence);
        }
    });

    orchestrator.start().await.unwrap();

    assert_eq!(*sequences.lock().unwrap(), vec![1, 2, 3, 4]);
}

/// Test: an observer can unsubscribe itself from inside the callback
#[tokio::test]
async fn test_self_unsubscribe_receives_no_more_snapshots() {
    let backend = batch_backend(&["product-1"]);
    let orchestrator = WorkflowOrchestrator::new(batch_deletion(&backend));
    let handle: Arc<OnceLock<Subscription>> = Arc::new(OnceLock::new());
    let count = Arc::new(AtomicUsize::new(0));

    let (slot, seen) = (Arc::clone(&handle), Arc::clone(&count));
    let subscription = orchestrator.subscribe(move |_: &WorkflowSnapshot| {
        seen.fetch_add(1, Ordering::SeqCst);
        if let Some(subscription) = slot.get() {
            subscription.unsubscribe();
        }
    });
    handle.set(subscription).unwrap();
    let recorder = Recorder::new();
    orchestrator.subscribe(recorder.clone());

    let report = orchestrator.start().await.unwrap();

    assert!(report.is_success());
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.count(), 4);
    assert_eq!(orchestrator.observer_count(), 1);
}

/// Test: unsubscribing by id works too
#[tokio::test]
async fn test_unsubscribe_by_id_before_start() {
    let orchestrator = WorkflowOrchestrator::new(Workflow::new(vec![ok_step("a")]).unwrap());
    let recorder = Recorder::new();
    let subscription = orchestrator.subscribe(recorder.clone());

    assert!(orchestrator.unsubscribe(subscription.id()));
    orchestrator.start().await.unwrap();

    assert_eq!(recorder.count(), 0);
    assert!(!subscription.is_active());
}
