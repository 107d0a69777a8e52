//! Plain-text progress timeline.
//!
//! `TimelineView` turns a snapshot into the per-step lines a progress
//! timeline shows (waiting, in progress, done, failed, plus a final
//! completion marker). `TimelineObserver` is a [`ProgressObserver`] that
//! writes one line per step transition to any `std::io::Write`.

use std::io::Write;
use std::sync::Mutex;

use crate::core::{StepErrorKind, StepStatus};
use crate::orchestration::ProgressObserver;
use crate::util::lock;
use crate::workflow::{StepSnapshot, WorkflowId, WorkflowSnapshot, WorkflowStatus};

/// View struct for rendering a workflow timeline.
#[derive(Debug, Clone)]
pub struct TimelineView {
    pub id: WorkflowId,
    pub status: WorkflowStatus,
    /// Progress as (succeeded_steps, total_steps).
    pub progress: (usize, usize),
    pub lines: Vec<String>,
}

impl TimelineView {
    pub fn new(snapshot: &WorkflowSnapshot) -> Self {
        let mut lines: Vec<String> = snapshot.steps.iter().map(step_line).collect();
        lines.push(completion_line(snapshot));
        Self {
            id: snapshot.workflow_id,
            status: snapshot.status,
            progress: (snapshot.completed_count(), snapshot.steps.len()),
            lines,
        }
    }

    /// Calculate progress percentage (0-100).
    pub fn progress_percentage(&self) -> u16 {
        if self.progress.1 == 0 {
            return 100;
        }
        ((self.progress.0 * 100) / self.progress.1) as u16
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "workflow {} [{}] {}%\n",
            self.id.short(),
            self.status,
            self.progress_percentage()
        );
        for line in &self.lines {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

fn marker(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Idle => "[ ]",
        StepStatus::Running => "[~]",
        StepStatus::Success => "[x]",
        StepStatus::Error => "[!]",
    }
}

/// Render one step as a timeline line.
pub fn step_line(step: &StepSnapshot) -> String {
    let detail = match step.status {
        StepStatus::Idle => "waiting".to_string(),
        StepStatus::Running => "in progress".to_string(),
        StepStatus::Success => match step
            .result
            .as_ref()
            .and_then(|r| r.get("succeeded"))
            .and_then(|n| n.as_u64())
        {
            Some(count) => format!("done ({} items)", count),
            None => "done".to_string(),
        },
        StepStatus::Error => match &step.error {
            Some(error) if error.kind() == StepErrorKind::PartialActionFailure => {
                format!("failed: {}", error.message)
            }
            Some(error) => match &error.code {
                Some(code) => format!("failed: {} ({})", error.message, code),
                None => format!("failed: {}", error.message),
            },
            None => "failed".to_string(),
        },
    };
    format!("{} {}: {}", marker(step.status), step.label, detail)
}

fn completion_line(snapshot: &WorkflowSnapshot) -> String {
    match snapshot.status {
        WorkflowStatus::Success => "[x] complete".to_string(),
        WorkflowStatus::Error => "[!] aborted".to_string(),
        _ if snapshot.cancelled => "[-] cancelled".to_string(),
        _ => "[ ] waiting for completion".to_string(),
    }
}

/// Writes one line per step transition.
pub struct TimelineObserver<W: Write + Send> {
    out: Mutex<W>,
    last: Mutex<Vec<StepStatus>>,
}

impl<W: Write + Send> TimelineObserver<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            last: Mutex::new(Vec::new()),
        }
    }

    /// Take back the writer, e.g. to inspect a buffer.
    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<W: Write + Send> ProgressObserver for TimelineObserver<W> {
    fn on_snapshot(&self, snapshot: &WorkflowSnapshot) {
        let changed: Vec<&StepSnapshot> = {
            let mut last = lock(&self.last);
            if last.len() != snapshot.steps.len() {
                *last = vec![StepStatus::Idle; snapshot.steps.len()];
            }
            snapshot
                .steps
                .iter()
                .zip(last.iter_mut())
                .filter_map(|(step, prev)| {
                    if step.status == *prev {
                        return None;
                    }
                    *prev = step.status;
                    Some(step)
                })
                .collect()
        };

        let mut out = lock(&self.out);
        for step in changed {
            // A failed write only loses a progress line.
            let _ = writeln!(out, "#{} {}", snapshot.sequence, step_line(step));
        }
        let stopped = snapshot.cancelled
            && snapshot.steps.iter().all(|s| s.status != StepStatus::Running);
        if snapshot.is_terminal() || stopped {
            let _ = writeln!(out, "#{} {}", snapshot.sequence, completion_line(snapshot));
        }
        let _ = out.flush();
    }
}
