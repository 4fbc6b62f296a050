//! Store abstraction for the agent's durable state.
//!
//! Every unit gets exactly one store: a directory holding `agent.db` and the
//! append-only audit logs written by the broker and the command broker.

use crate::core::error::AgentError;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment override for the state directory.
pub const STATE_DIR_ENV: &str = "MICROK8S_AGENT_STATE_DIR";

/// Directory name used under the charm directory (or the working directory).
pub const STATE_DIR_NAME: &str = ".microk8s-agent";

/// Store handle representing the agent's state workspace.
#[derive(Debug, Clone)]
pub struct Store {
    /// Absolute path to the store root directory
    pub root: PathBuf,
}

impl Store {
    /// Open (and create if needed) the store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, AgentError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(AgentError::IoError)?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }
}

/// Pick the state directory: explicit flag, then `MICROK8S_AGENT_STATE_DIR`,
/// then `$JUJU_CHARM_DIR/.microk8s-agent`, then `./.microk8s-agent`.
pub fn resolve_state_dir(
    explicit: Option<&Path>,
    env_state_dir: Option<&str>,
    charm_dir: Option<&str>,
    cwd: &Path,
) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    if let Some(dir) = env_state_dir.filter(|d| !d.trim().is_empty()) {
        return PathBuf::from(dir);
    }
    if let Some(dir) = charm_dir.filter(|d| !d.trim().is_empty()) {
        return Path::new(dir).join(STATE_DIR_NAME);
    }
    cwd.join(STATE_DIR_NAME)
}
