use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{Error, Result};

/// What the orchestrator does with the remaining steps once one fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Start no new step after the first failure.
    #[default]
    Halt,
    /// Keep starting steps that do not depend on a failed step.
    ContinueIndependent,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::Halt => write!(f, "halt"),
            FailurePolicy::ContinueIndependent => write!(f, "continue_independent"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum number of steps in flight at once. 1 runs steps strictly
    /// sequentially in declaration order.
    pub max_concurrency: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            failure_policy: FailurePolicy::Halt,
        }
    }
}

impl OrchestratorConfig {
    pub fn teardown_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".teardown"))
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::teardown_dir()?.join("teardown.toml"))
    }

    /// Load from `path`, falling back to defaults when the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "OrchestratorConfig::load");
        if !path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    /// Load from the default location under the home directory.
    pub fn load_default() -> Result<Self> {
        Self::load(&Self::default_path()?)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        debug!(
            max_concurrency = config.max_concurrency,
            failure_policy = %config.failure_policy,
            "Config loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(Error::Validation(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }
}
