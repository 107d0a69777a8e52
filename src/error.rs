use thiserror::Error;

use crate::core::StepId;
use crate::workflow::WorkflowId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Workflow {workflow} was already started")]
    AlreadyStarted { workflow: WorkflowId },

    #[error("Step {step} cannot start: dependency {dependency} has not succeeded")]
    DependencyUnmet { step: StepId, dependency: StepId },

    #[error("Step not found: {0}")]
    StepNotFound(StepId),

    #[error("Step is already running: {0}")]
    StepAlreadyRunning(StepId),

    #[error("Step has already finished: {0}")]
    StepFinished(StepId),

    #[error("Duplicate step id: {0}")]
    DuplicateStep(StepId),

    #[error("Step {step} depends on unknown step {dependency}")]
    UnknownDependency { step: StepId, dependency: StepId },

    #[error("Dependency cycle detected at step: {0}")]
    DependencyCycle(StepId),
}

pub type Result<T> = std::result::Result<T, Error>;
