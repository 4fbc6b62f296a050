//! Confined-package (snap) actions: install from a channel and presence query.

use crate::core::error::AgentError;
use crate::core::external_action::{self, CommandRunner, HostCapability};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const SNAP_BIN: &str = "snap";

static PACKAGE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9+.\-]*$").unwrap());

/// Reject names that are empty or could be read as an option flag.
pub fn validate_package_name(name: &str) -> Result<(), AgentError> {
    if PACKAGE_NAME.is_match(name) {
        return Ok(());
    }
    Err(AgentError::InvalidArgument(format!(
        "'{}' is not a valid package name",
        name
    )))
}

/// Options for `snap install`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapOptions {
    pub channel: String,
    pub devmode: bool,
    pub jailmode: bool,
    pub dangerous: bool,
    /// Older spelling of `dangerous`; either one yields `--dangerous`.
    pub force_dangerous: bool,
    pub classic: bool,
    pub revision: Option<u64>,
}

impl Default for SnapOptions {
    fn default() -> Self {
        Self {
            channel: "stable".to_string(),
            devmode: false,
            jailmode: false,
            dangerous: false,
            force_dangerous: false,
            classic: false,
            revision: None,
        }
    }
}

impl SnapOptions {
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.channel.trim().is_empty() || self.channel.chars().any(char::is_whitespace) {
            return Err(AgentError::InvalidArgument(format!(
                "'{}' is not a valid snap channel",
                self.channel
            )));
        }
        if self.devmode && self.jailmode {
            return Err(AgentError::InvalidArgument(
                "devmode and jailmode are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }

    /// Flags in the order `snap install` receives them.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![format!("--channel={}", self.channel)];
        if self.devmode {
            args.push("--devmode".to_string());
        }
        if self.jailmode {
            args.push("--jailmode".to_string());
        }
        if self.dangerous || self.force_dangerous {
            args.push("--dangerous".to_string());
        }
        if self.classic {
            args.push("--classic".to_string());
        }
        if let Some(revision) = self.revision {
            args.push(format!("--revision={}", revision));
        }
        args
    }
}

pub fn install_args(name: &str, options: &SnapOptions) -> Result<Vec<String>, AgentError> {
    validate_package_name(name)?;
    options.validate()?;
    let mut args = vec!["install".to_string()];
    args.extend(options.args());
    args.push(name.to_string());
    Ok(args)
}

/// Install `name` and return the combined command output.
pub fn install(
    runner: &dyn CommandRunner,
    name: &str,
    options: &SnapOptions,
) -> Result<String, AgentError> {
    let args = install_args(name, options)?;
    tracing::info!(snap = name, channel = %options.channel, "installing snap from store");
    let output = runner.run(HostCapability::SnapInstall, SNAP_BIN, &args)?;
    let output = external_action::ensure_success(SNAP_BIN, &args, output)?;
    Ok(output.combined())
}

/// `snap list <name>` exits non-zero with this message when the snap is absent.
const NOT_INSTALLED_MARKER: &str = "no matching snaps installed";

pub fn is_installed(runner: &dyn CommandRunner, name: &str) -> Result<bool, AgentError> {
    validate_package_name(name)?;
    let args = vec!["list".to_string(), name.to_string()];
    let output = runner.run(HostCapability::SnapQuery, SNAP_BIN, &args)?;
    if output.success() {
        return Ok(true);
    }
    if output.combined().contains(NOT_INSTALLED_MARKER) {
        return Ok(false);
    }
    Err(AgentError::CommandFailed {
        command: external_action::command_line(SNAP_BIN, &args),
        code: output.code,
        output: output.combined(),
    })
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "snap",
        "version": "0.1.0",
        "description": "Install confined packages from a channel and query their presence",
        "commands": [
            { "name": "install", "parameters": ["name", "channel", "devmode", "jailmode", "dangerous", "classic", "revision"] },
            { "name": "list", "parameters": ["name"] }
        ]
    })
}
