//! Shared utility functions.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::timeout;

use crate::core::{ActionError, ActionResult};

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Every critical section in this crate is a plain field update or a
/// clone, so the protected data stays consistent even after a panic.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Race a step action against a timer.
///
/// The orchestrator has no notion of elapsed time, so a step that must not
/// hang wraps its own action with this. Expiry becomes an [`ActionError`]
/// with code `timeout`; the remote side may still complete the operation.
pub async fn with_timeout<F>(duration: Duration, action: F) -> ActionResult
where
    F: Future<Output = ActionResult>,
{
    match timeout(duration, action).await {
        Ok(outcome) => outcome,
        Err(_) => Err(
            ActionError::new(format!("action timed out after {:?}", duration)).with_code("timeout"),
        ),
    }
}
