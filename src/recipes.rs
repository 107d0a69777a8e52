//! Prebuilt workflow shapes.
//!
//! Each recipe only wires steps together; the remote calls are passed in
//! as closures so a recipe works the same against HTTP, RPC or the
//! in-memory backend.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{ActionResult, Step};
use crate::error::Result;
use crate::workflow::Workflow;

pub const REMOVE_CHILDREN: &str = "remove_children";
pub const REMOVE_PARENT: &str = "remove_parent";
pub const RESPOND_INVITE: &str = "respond_invite";
pub const REFRESH: &str = "refresh";
pub const COMPLETE_PROFILE: &str = "complete_profile";
pub const ENTER_WORKSPACE: &str = "enter_workspace";

/// Delete every child of `parent`, then `parent` itself.
///
/// The children are removed by one fan-out step; the parent step depends on
/// it, so a single failed child leaves the parent untouched. An empty child
/// list makes no child calls and goes straight to the parent.
pub fn cascade_delete<C, CF, P, PF>(
    parent: impl Into<String>,
    children: Vec<String>,
    delete_child: C,
    delete_parent: P,
) -> Result<Workflow>
where
    C: Fn(String) -> CF + Send + Sync + 'static,
    CF: Future<Output = ActionResult> + Send + 'static,
    P: Fn(String) -> PF + Send + Sync + 'static,
    PF: Future<Output = ActionResult> + Send + 'static,
{
    let parent = parent.into();
    let count = children.len();
    let remove_children = Step::fan_out(REMOVE_CHILDREN, children, String::clone, delete_child)
        .with_label(format!("Remove {count} children of {parent}"));

    let label = format!("Remove {parent}");
    let remove_parent = Step::new(REMOVE_PARENT, move || delete_parent(parent.clone()))
        .with_label(label)
        .depends_on(REMOVE_CHILDREN);

    Workflow::builder()
        .step(remove_children)
        .step(remove_parent)
        .build()
}

/// Answer to a pending invite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteDecision {
    Accept,
    Decline,
}

impl std::fmt::Display for InviteDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InviteDecision::Accept => write!(f, "accept"),
            InviteDecision::Decline => write!(f, "decline"),
        }
    }
}

/// Accept or decline an invite, then refresh the caller's view.
///
/// `respond` receives the decision and performs the matching remote call.
/// `refresh` only runs once the response succeeded.
pub fn invite_response<R, RF, F, FF>(
    workspace: impl Into<String>,
    decision: InviteDecision,
    respond: R,
    refresh: F,
) -> Result<Workflow>
where
    R: Fn(String, InviteDecision) -> RF + Send + Sync + 'static,
    RF: Future<Output = ActionResult> + Send + 'static,
    F: Fn() -> FF + Send + Sync + 'static,
    FF: Future<Output = ActionResult> + Send + 'static,
{
    let workspace = workspace.into();
    let label = format!("{} invite to {}", decision, workspace);
    let respond = Step::new(RESPOND_INVITE, move || respond(workspace.clone(), decision))
        .with_label(label);
    let refresh = Step::new(REFRESH, refresh).depends_on(RESPOND_INVITE);

    Workflow::builder().step(respond).step(refresh).build()
}

/// Gate workspace entry behind profile completion.
///
/// `save_profile` and `enter` are independent closures; the dependency
/// makes sure nobody enters a workspace with an unsaved profile.
pub fn onboarding<T, S, SF, E, EF>(profile: T, save_profile: S, enter: E) -> Result<Workflow>
where
    T: Clone + Send + Sync + 'static,
    S: Fn(T) -> SF + Send + Sync + 'static,
    SF: Future<Output = ActionResult> + Send + 'static,
    E: Fn() -> EF + Send + Sync + 'static,
    EF: Future<Output = ActionResult> + Send + 'static,
{
    let profile = Arc::new(profile);
    let complete = Step::new(COMPLETE_PROFILE, move || save_profile(profile.as_ref().clone()))
        .with_label("Complete profile");
    let enter = Step::new(ENTER_WORKSPACE, enter)
        .with_label("Enter workspace")
        .depends_on(COMPLETE_PROFILE);

    Workflow::builder().step(complete).step(enter).build()
}
