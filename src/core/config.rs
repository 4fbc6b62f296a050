//! Agent configuration loaded from `agent.toml`.
//!
//! Resolution order: `--config <path>`, then `$JUJU_CHARM_DIR/agent.toml`,
//! then built-in defaults. A missing default file is not an error.

use crate::core::error::AgentError;
use crate::plugins::snap::{self, SnapOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "agent.toml";
pub const CHARM_DIR_ENV: &str = "JUJU_CHARM_DIR";

/// What to do when adding the operator user to the admin group fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GroupFailurePolicy {
    /// Log a warning and carry on to `active`.
    #[default]
    Warn,
    /// Report `blocked`, skip the remaining configuration and defer `start`
    /// for a retry. The readiness flag keeps whatever value it already had.
    Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Snap providing the cluster node.
    pub package: String,
    pub snap: SnapOptions,
    pub operator_user: String,
    pub admin_group: String,
    /// Prefix the group change with `sudo`.
    pub use_sudo: bool,
    /// Apt packages installed once the cluster node is present.
    pub auxiliary_packages: Vec<String>,
    /// `None` means the apt defaults (`--force-confold`).
    pub apt_options: Option<Vec<String>>,
    pub command_timeout_secs: u64,
    pub ready_message: String,
    pub group_failure: GroupFailurePolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            package: "microk8s".to_string(),
            snap: SnapOptions::default(),
            operator_user: "ubuntu".to_string(),
            admin_group: "microk8s".to_string(),
            use_sudo: true,
            auxiliary_packages: vec!["hello".to_string()],
            apt_options: None,
            command_timeout_secs: 600,
            ready_message: "Ready!".to_string(),
            group_failure: GroupFailurePolicy::Warn,
        }
    }
}

impl AgentConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.command_timeout_secs == 0 {
            return Err(AgentError::ConfigError(
                "command_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.operator_user.trim().is_empty() || self.admin_group.trim().is_empty() {
            return Err(AgentError::ConfigError(
                "operator_user and admin_group must not be empty".to_string(),
            ));
        }
        snap::validate_package_name(&self.package)
            .map_err(|e| AgentError::ConfigError(e.to_string()))?;
        for pkg in &self.auxiliary_packages {
            snap::validate_package_name(pkg).map_err(|e| AgentError::ConfigError(e.to_string()))?;
        }
        self.snap
            .validate()
            .map_err(|e| AgentError::ConfigError(e.to_string()))?;
        Ok(())
    }
}

pub fn parse_config(content: &str) -> Result<AgentConfig, AgentError> {
    let config: AgentConfig =
        toml::from_str(content).map_err(|e| AgentError::ConfigError(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Load configuration. An explicit path must exist; the charm-dir file is optional.
pub fn load_config(
    explicit: Option<&Path>,
    charm_dir: Option<&str>,
) -> Result<AgentConfig, AgentError> {
    let path: Option<PathBuf> = match explicit {
        Some(p) => {
            if !p.exists() {
                return Err(AgentError::ConfigError(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            Some(p.to_path_buf())
        }
        None => charm_dir
            .filter(|d| !d.trim().is_empty())
            .map(|d| Path::new(d).join(CONFIG_FILE_NAME))
            .filter(|p| p.exists()),
    };

    let Some(path) = path else {
        return Ok(AgentConfig::default());
    };
    tracing::debug!(path = %path.display(), "loading agent config");
    let content = fs::read_to_string(&path).map_err(AgentError::IoError)?;
    parse_config(&content)
}
