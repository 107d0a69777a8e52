//! In-memory backend for the demo binary and tests.
//!
//! `MemoryBackend` stands in for the remote service a host application
//! would call: parent resources owning child resources, pending workspace
//! invites, and a user profile. Failures can be injected per resource name
//! so every branch of a recipe can be exercised without a network.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::core::{ActionError, ActionResult};
use crate::util::lock;

/// Profile fields collected by the onboarding form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub display_name: String,
    pub handle: String,
}

impl Profile {
    pub fn new(display_name: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            handle: handle.into(),
        }
    }

    /// Both fields are required before the profile counts as complete.
    pub fn is_complete(&self) -> bool {
        !self.display_name.trim().is_empty() && !self.handle.trim().is_empty()
    }
}

#[derive(Debug, Default)]
struct Inner {
    /// Parent id -> ids of its children.
    parents: BTreeMap<String, BTreeSet<String>>,
    invites: BTreeSet<String>,
    memberships: BTreeSet<String>,
    profile: Option<Profile>,
    failing: HashSet<String>,
    calls: usize,
}

/// Shared handle to an in-memory store. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
    latency: Duration,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` so steps actually suspend.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Add a parent with the given children, replacing any existing one.
    pub fn insert_parent<I, S>(&self, parent: impl Into<String>, children: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let children = children.into_iter().map(Into::into).collect();
        lock(&self.inner).parents.insert(parent.into(), children);
    }

    pub fn insert_invite(&self, workspace: impl Into<String>) {
        lock(&self.inner).invites.insert(workspace.into());
    }

    /// Make every call naming `resource` fail with HTTP 500.
    pub fn fail_on(&self, resource: impl Into<String>) {
        lock(&self.inner).failing.insert(resource.into());
    }

    pub fn has_parent(&self, parent: &str) -> bool {
        lock(&self.inner).parents.contains_key(parent)
    }

    pub fn children(&self, parent: &str) -> Vec<String> {
        lock(&self.inner)
            .parents
            .get(parent)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn invites(&self) -> Vec<String> {
        lock(&self.inner).invites.iter().cloned().collect()
    }

    pub fn memberships(&self) -> Vec<String> {
        lock(&self.inner).memberships.iter().cloned().collect()
    }

    pub fn profile(&self) -> Option<Profile> {
        lock(&self.inner).profile.clone()
    }

    /// Number of calls made so far, failed ones included.
    pub fn calls(&self) -> usize {
        lock(&self.inner).calls
    }

    async fn call(&self, resource: &str) -> Result<(), ActionError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut inner = lock(&self.inner);
        inner.calls += 1;
        if inner.failing.contains(resource) {
            debug!(resource, "Injected failure");
            return Err(
                ActionError::new(format!("HTTP error deleting {resource}")).with_code("500")
            );
        }
        Ok(())
    }

    /// Remove one child from whichever parent owns it.
    pub async fn delete_child(&self, child: String) -> ActionResult {
        self.call(&child).await?;
        let mut inner = lock(&self.inner);
        let owner = inner
            .parents
            .iter_mut()
            .find(|(_, children)| children.contains(&child));
        match owner {
            Some((parent, children)) => {
                children.remove(&child);
                Ok(json!({ "id": child, "parent": parent }))
            }
            None => Err(ActionError::new(format!("{child} not found")).with_code("404")),
        }
    }

    /// Remove a parent. Refused while it still owns children.
    pub async fn delete_parent(&self, parent: String) -> ActionResult {
        self.call(&parent).await?;
        let mut inner = lock(&self.inner);
        let remaining = match inner.parents.get(&parent) {
            Some(children) => children.len(),
            None => {
                return Err(ActionError::new(format!("{parent} not found")).with_code("404"))
            }
        };
        if remaining > 0 {
            return Err(ActionError::new(format!(
                "{parent} still has {remaining} children"
            ))
            .with_code("409"));
        }
        inner.parents.remove(&parent);
        Ok(json!({ "id": parent }))
    }

    pub async fn accept_invite(&self, workspace: String) -> ActionResult {
        self.call(&workspace).await?;
        let mut inner = lock(&self.inner);
        if !inner.invites.remove(&workspace) {
            return Err(no_invite(&workspace));
        }
        inner.memberships.insert(workspace.clone());
        Ok(json!({ "workspace": workspace, "accepted": true }))
    }

    pub async fn decline_invite(&self, workspace: String) -> ActionResult {
        self.call(&workspace).await?;
        if !lock(&self.inner).invites.remove(&workspace) {
            return Err(no_invite(&workspace));
        }
        Ok(json!({ "workspace": workspace, "accepted": false }))
    }

    pub async fn update_profile(&self, profile: Profile) -> ActionResult {
        self.call("profile").await?;
        if !profile.is_complete() {
            return Err(ActionError::new("display name and handle are required").with_code("400"));
        }
        let value = serde_json::to_value(&profile)
            .map_err(|e| ActionError::new(e.to_string()))?;
        lock(&self.inner).profile = Some(profile);
        Ok(value)
    }

    /// Workspaces the user belongs to. Requires a completed profile.
    pub async fn workspaces(&self) -> ActionResult {
        self.call("workspaces").await?;
        let inner = lock(&self.inner);
        if !inner.profile.as_ref().is_some_and(Profile::is_complete) {
            return Err(ActionError::new("profile incomplete").with_code("403"));
        }
        Ok(Value::from(
            inner.memberships.iter().cloned().collect::<Vec<String>>(),
        ))
    }
}

fn no_invite(workspace: &str) -> ActionError {
    ActionError::new(format!("no pending invite to {workspace}")).with_code("404")
}
