//! Progress observers.
//!
//! Observers are the only way the orchestrator talks to the outside world.
//! They receive a fresh [`WorkflowSnapshot`] synchronously after every step
//! transition and decide on their own how to render it or what to do once
//! the workflow is terminal.

use std::sync::{Arc, Mutex, Weak};

use crate::util::lock;
use crate::workflow::WorkflowSnapshot;

/// A passive sink for workflow snapshots.
///
/// Implementations must not panic; the orchestrator does not catch or
/// retry failures raised from a sink.
pub trait ProgressObserver: Send + Sync {
    fn on_snapshot(&self, snapshot: &WorkflowSnapshot);
}

impl<F> ProgressObserver for F
where
    F: Fn(&WorkflowSnapshot) + Send + Sync,
{
    fn on_snapshot(&self, snapshot: &WorkflowSnapshot) {
        self(snapshot)
    }
}

/// Identifier of a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Registered {
    next_id: u64,
    observers: Vec<(SubscriptionId, Arc<dyn ProgressObserver>)>,
}

/// The set of observers of one orchestrator.
#[derive(Default)]
pub(crate) struct ObserverRegistry {
    inner: Mutex<Registered>,
}

impl ObserverRegistry {
    pub(crate) fn subscribe(&self, observer: Arc<dyn ProgressObserver>) -> SubscriptionId {
        let mut inner = lock(&self.inner);
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.observers.push((id, observer));
        id
    }

    /// Remove an observer. Returns false if it was not registered.
    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = lock(&self.inner);
        let before = inner.observers.len();
        inner.observers.retain(|(sid, _)| *sid != id);
        inner.observers.len() != before
    }

    pub(crate) fn is_subscribed(&self, id: SubscriptionId) -> bool {
        lock(&self.inner).observers.iter().any(|(sid, _)| *sid == id)
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.inner).observers.len()
    }

    /// Deliver a snapshot to every observer.
    ///
    /// The registry lock is not held while an observer runs, so callbacks
    /// may subscribe or unsubscribe (themselves included). An observer
    /// removed mid-dispatch is skipped for the rest of it.
    pub(crate) fn notify(&self, snapshot: &WorkflowSnapshot) {
        let current: Vec<(SubscriptionId, Arc<dyn ProgressObserver>)> =
            lock(&self.inner).observers.clone();
        for (id, observer) in current {
            if self.is_subscribed(id) {
                observer.on_snapshot(snapshot);
            }
        }
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping the handle keeps the observer registered; call
/// [`Subscription::unsubscribe`] to remove it. The handle may be moved into
/// the observer itself so the callback can unsubscribe from within.
#[derive(Clone)]
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<ObserverRegistry>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, registry: &Arc<ObserverRegistry>) -> Self {
        Self {
            id,
            registry: Arc::downgrade(registry),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stop receiving snapshots. Returns false if already unsubscribed or
    /// the orchestrator is gone.
    pub fn unsubscribe(&self) -> bool {
        self.registry
            .upgrade()
            .map(|registry| registry.unsubscribe(self.id))
            .unwrap_or(false)
    }

    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .map(|registry| registry.is_subscribed(self.id))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
