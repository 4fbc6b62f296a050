//! Workload status reporting through the `status-set` hook tool.
//!
//! The status message is the only signal the operator sees in `juju status`;
//! everything else is diagnostics.

use crate::core::error::AgentError;
use crate::core::external_action::{self, CommandRunner, HostCapability};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const STATUS_SET_BIN: &str = "status-set";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadState {
    Maintenance,
    Blocked,
    Waiting,
    Active,
}

impl WorkloadState {
    pub const ALL: [WorkloadState; 4] = [
        WorkloadState::Maintenance,
        WorkloadState::Blocked,
        WorkloadState::Waiting,
        WorkloadState::Active,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WorkloadState::Maintenance => "maintenance",
            WorkloadState::Blocked => "blocked",
            WorkloadState::Waiting => "waiting",
            WorkloadState::Active => "active",
        }
    }
}

impl fmt::Display for WorkloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadState {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkloadState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| {
                AgentError::InvalidArgument(format!("'{}' is not a valid workload state", s))
            })
    }
}

/// Validate `state` and forward it to `status-set`. An invalid state never
/// reaches the host.
pub fn status_set(
    runner: &dyn CommandRunner,
    state: &str,
    message: &str,
) -> Result<(), AgentError> {
    let state: WorkloadState = state.parse()?;
    let args = vec![state.as_str().to_string(), message.to_string()];
    let output = runner.run(HostCapability::StatusReport, STATUS_SET_BIN, &args)?;
    external_action::ensure_success(STATUS_SET_BIN, &args, output)?;
    Ok(())
}
