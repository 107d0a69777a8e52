use std::io;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgGroup, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use teardown::memory::{MemoryBackend, Profile};
use teardown::recipes::{self, InviteDecision};
use teardown::render::TimelineView;
use teardown::{
    Error, OrchestratorConfig, Result, StepId, TimelineObserver, Workflow, WorkflowOrchestrator,
    WorkflowReport, WorkflowSnapshot, WorkflowStatus,
};

/// Teardown - run multi-step destructive operations with live progress
#[derive(Parser, Debug)]
#[command(name = "teardown")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    TEARDOWN_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Orchestrator config file (default: ~/.teardown/teardown.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Print the final snapshot as JSON instead of a timeline
    #[arg(long, global = true)]
    pub json: bool,

    /// Simulated latency of every backend call, in milliseconds
    #[arg(long, global = true, default_value_t = 50)]
    pub latency_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Delete a batch and its products
    Demo {
        /// Number of products in the batch
        #[arg(long, default_value_t = 2)]
        children: usize,

        /// Make the deletion of this resource fail (repeatable)
        #[arg(long = "fail")]
        fail: Vec<String>,

        /// Override max_concurrency from the config
        #[arg(long)]
        concurrency: Option<usize>,

        /// Cancel once the products are gone, leaving the batch in place
        #[arg(long)]
        cancel_after_children: bool,
    },

    /// Respond to a workspace invite
    #[command(group(ArgGroup::new("decision").required(true).args(["accept", "decline"])))]
    Invite {
        /// Workspace the invite is for
        #[arg(long, default_value = "ws-1")]
        workspace: String,

        #[arg(long)]
        accept: bool,

        #[arg(long)]
        decline: bool,
    },

    /// Complete the profile, then enter the workspace
    Onboard {
        #[arg(long, default_value = "")]
        display_name: String,

        #[arg(long, default_value = "")]
        handle: String,
    },
}

fn init_tracing(debug: bool) {
    let debug = debug || std::env::var("TEARDOWN_DEBUG").is_ok_and(|v| v == "1");
    let filter = if debug {
        EnvFilter::new("teardown=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("teardown=warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<OrchestratorConfig> {
    match path {
        Some(path) => OrchestratorConfig::load(path),
        None => OrchestratorConfig::load_default(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    tracing::debug!(?cli, "Teardown starting");

    let mut config = load_config(cli.config.as_ref())?;
    let backend = MemoryBackend::new().with_latency(Duration::from_millis(cli.latency_ms));

    let (workflow, cancel_after) = match cli.command.clone() {
        Command::Demo {
            children,
            fail,
            concurrency,
            cancel_after_children,
        } => {
            if let Some(concurrency) = concurrency {
                config = config.with_max_concurrency(concurrency);
                config.validate()?;
            }
            (
                demo_workflow(&backend, children, &fail)?,
                cancel_after_children.then_some(recipes::REMOVE_CHILDREN),
            )
        }
        Command::Invite { workspace, accept, .. } => {
            let decision = if accept {
                InviteDecision::Accept
            } else {
                InviteDecision::Decline
            };
            (invite_workflow(&backend, workspace, decision)?, None)
        }
        Command::Onboard {
            display_name,
            handle,
        } => (
            onboard_workflow(&backend, Profile::new(display_name, handle))?,
            None,
        ),
    };

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(run(workflow, config, cli.json, cancel_after))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report.snapshot)?);
    } else {
        println!();
        print!("{}", TimelineView::new(&report.snapshot).render());
        for line in blocked_lines(&report) {
            println!("  {line}");
        }
    }

    match report.status() {
        WorkflowStatus::Success => Ok(()),
        status => Err(Error::Validation(format!(
            "workflow finished with status {}{}",
            status,
            if report.cancelled() { " (cancelled)" } else { "" }
        ))),
    }
}

async fn run(
    workflow: Workflow,
    config: OrchestratorConfig,
    json: bool,
    cancel_after: Option<&'static str>,
) -> Result<WorkflowReport> {
    let orchestrator = WorkflowOrchestrator::with_config(workflow, config);

    if !json {
        orchestrator.subscribe(TimelineObserver::new(io::stdout()));
    }
    if let Some(step) = cancel_after {
        let token = orchestrator.cancellation_token();
        orchestrator.subscribe(move |snapshot: &WorkflowSnapshot| {
            if snapshot.status_of(step).is_terminal() {
                token.cancel();
            }
        });
    }

    orchestrator.start().await
}

/// One line per failed step that left dependents unable to run.
fn blocked_lines(report: &WorkflowReport) -> Vec<String> {
    report
        .blocked
        .iter()
        .map(|(failed, steps)| {
            let names: Vec<&str> = steps.iter().map(StepId::as_str).collect();
            format!("[-] blocked by {}: {}", failed, names.join(", "))
        })
        .collect()
}

fn demo_workflow(backend: &MemoryBackend, children: usize, fail: &[String]) -> Result<Workflow> {
    let products: Vec<String> = (1..=children).map(|n| format!("product-{n}")).collect();
    backend.insert_parent("batch-1", products.iter().cloned());
    for name in fail {
        backend.fail_on(name.clone());
    }

    let (child_backend, parent_backend) = (backend.clone(), backend.clone());
    recipes::cascade_delete(
        "batch-1",
        products,
        move |product| {
            let backend = child_backend.clone();
            async move { backend.delete_child(product).await }
        },
        move |batch| {
            let backend = parent_backend.clone();
            async move { backend.delete_parent(batch).await }
        },
    )
}

fn invite_workflow(
    backend: &MemoryBackend,
    workspace: String,
    decision: InviteDecision,
) -> Result<Workflow> {
    backend.insert_invite(workspace.clone());
    let responder = backend.clone();
    let refresher = backend.clone();
    recipes::invite_response(
        workspace,
        decision,
        move |workspace, decision| {
            let backend = responder.clone();
            async move {
                match decision {
                    InviteDecision::Accept => backend.accept_invite(workspace).await,
                    InviteDecision::Decline => backend.decline_invite(workspace).await,
                }
            }
        },
        move || {
            let backend = refresher.clone();
            async move { Ok(serde_json::json!({ "memberships": backend.memberships() })) }
        },
    )
}

fn onboard_workflow(backend: &MemoryBackend, profile: Profile) -> Result<Workflow> {
    let (saver, lister) = (backend.clone(), backend.clone());
    recipes::onboarding(
        profile,
        move |profile| {
            let backend = saver.clone();
            async move { backend.update_profile(profile).await }
        },
        move || {
            let backend = lister.clone();
            async move { backend.workspaces().await }
        },
    )
}
