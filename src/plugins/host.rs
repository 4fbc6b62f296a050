//! Host action executor: the side-effecting leaf the reconciler drives.
//!
//! Each call is a direct, synchronous host mutation with no internal retry.
//! `Host` routes everything through a [`CommandRunner`], so the whole surface
//! can be exercised against a recorder.

use crate::core::error::AgentError;
use crate::core::external_action::{self, CommandRunner, HostCapability};
use crate::plugins::snap::SnapOptions;
use crate::plugins::{apt, juju_log, snap, status};
use regex::Regex;
use std::sync::LazyLock;

static ACCOUNT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_\-]*\$?$").unwrap());

pub trait HostActions {
    fn install_packages(
        &self,
        packages: &[String],
        options: Option<&[String]>,
    ) -> Result<(), AgentError>;

    /// Returns the combined `snap install` output.
    fn install_snap(&self, name: &str, options: &SnapOptions) -> Result<String, AgentError>;

    fn is_snap_installed(&self, name: &str) -> Result<bool, AgentError>;

    fn add_user_to_group(&self, user: &str, group: &str) -> Result<(), AgentError>;

    fn report_status(&self, state: &str, message: &str) -> Result<(), AgentError>;

    fn log(&self, message: &str, level: Option<&str>);
}

pub struct Host<R: CommandRunner> {
    runner: R,
    use_sudo: bool,
}

impl<R: CommandRunner> Host<R> {
    pub fn new(runner: R, use_sudo: bool) -> Self {
        Self { runner, use_sudo }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn usermod_invocation(&self, user: &str, group: &str) -> (&'static str, Vec<String>) {
        let usermod = vec![
            "-a".to_string(),
            "-G".to_string(),
            group.to_string(),
            user.to_string(),
        ];
        if self.use_sudo {
            let mut args = vec!["usermod".to_string()];
            args.extend(usermod);
            ("sudo", args)
        } else {
            ("usermod", usermod)
        }
    }
}

impl<R: CommandRunner> HostActions for Host<R> {
    fn install_packages(
        &self,
        packages: &[String],
        options: Option<&[String]>,
    ) -> Result<(), AgentError> {
        self.log(
            &format!(
                "Installing {:?} with options: {:?}",
                packages,
                options.map(|o| o.to_vec()).unwrap_or_else(apt::default_options)
            ),
            None,
        );
        apt::install(&self.runner, packages, options)
    }

    fn install_snap(&self, name: &str, options: &SnapOptions) -> Result<String, AgentError> {
        self.log(&format!("Installing {} from store", name), None);
        snap::install(&self.runner, name, options)
    }

    fn is_snap_installed(&self, name: &str) -> Result<bool, AgentError> {
        snap::is_installed(&self.runner, name)
    }

    fn add_user_to_group(&self, user: &str, group: &str) -> Result<(), AgentError> {
        for name in [user, group] {
            if !ACCOUNT_NAME.is_match(name) {
                return Err(AgentError::InvalidArgument(format!(
                    "'{}' is not a valid user or group name",
                    name
                )));
            }
        }
        let (program, args) = self.usermod_invocation(user, group);
        let output = self.runner.run(HostCapability::GroupChange, program, &args)?;
        external_action::ensure_success(program, &args, output)?;
        Ok(())
    }

    fn report_status(&self, state: &str, message: &str) -> Result<(), AgentError> {
        status::status_set(&self.runner, state, message)
    }

    fn log(&self, message: &str, level: Option<&str>) {
        juju_log::juju_log(&self.runner, message, level);
    }
}
