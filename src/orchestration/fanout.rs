//! Fan-out actions.
//!
//! A fan-out runs one remote operation per child item (e.g. one DELETE per
//! product of a batch) and folds the results into a single all-or-nothing
//! outcome. Items that succeeded are already committed remotely; when any
//! item fails the step fails with a [`PartialFailure`] listing the failed
//! items, and nothing is rolled back.
//!
//! [`PartialFailure`]: crate::core::PartialFailure

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::json;
use tracing::debug;

use crate::core::{ActionError, ActionResult, ItemFailure, Step, StepId};

/// Run `op` for every item concurrently and fold the outcomes.
///
/// An empty item list succeeds immediately without calling `op`.
/// On success the result is `{"attempted": n, "succeeded": n, "items": [...]}`.
pub async fn fan_out<T, K, F, Fut>(items: Vec<T>, key: K, op: F) -> ActionResult
where
    K: Fn(&T) -> String,
    F: Fn(T) -> Fut,
    Fut: Future<Output = ActionResult>,
{
    if items.is_empty() {
        debug!("Empty fan-out, nothing to do");
        return Ok(json!({ "attempted": 0, "succeeded": 0, "items": [] }));
    }

    let attempted = items.len();
    let calls = items.into_iter().map(|item| {
        let name = key(&item);
        let call = op(item);
        async move { (name, call.await) }
    });
    let outcomes = join_all(calls).await;

    let mut succeeded = Vec::with_capacity(attempted);
    let mut failed = Vec::new();
    for (item, outcome) in outcomes {
        match outcome {
            Ok(_) => succeeded.push(item),
            Err(err) => failed.push(ItemFailure {
                item,
                message: err.message,
                code: err.code,
            }),
        }
    }

    debug!(attempted, failed = failed.len(), "Fan-out finished");
    if failed.is_empty() {
        Ok(json!({
            "attempted": attempted,
            "succeeded": succeeded.len(),
            "items": succeeded,
        }))
    } else {
        Err(ActionError::partial(attempted, failed))
    }
}

impl Step {
    /// A step whose action fans `op` out over `items`.
    ///
    /// `key` names each item in the partial-failure report.
    pub fn fan_out<T, K, F, Fut>(id: impl Into<StepId>, items: Vec<T>, key: K, op: F) -> Step
    where
        T: Clone + Send + Sync + 'static,
        K: Fn(&T) -> String + Send + Sync + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        let items = Arc::new(items);
        let key = Arc::new(key);
        let op = Arc::new(op);
        Step::new(id, move || {
            let items = Arc::clone(&items);
            let key = Arc::clone(&key);
            let op = Arc::clone(&op);
            async move { fan_out(items.to_vec(), key.as_ref(), op.as_ref()).await }
        })
    }
}
