//! Debian package installs through `apt-get`.

use crate::core::error::AgentError;
use crate::core::external_action::{self, CommandRunner, HostCapability};
use crate::plugins::snap::validate_package_name;

const APT_BIN: &str = "apt-get";

pub fn default_options() -> Vec<String> {
    vec!["--option=Dpkg::Options::=--force-confold".to_string()]
}

/// `apt-get --assume-yes <options> install <packages>`; `None` options means
/// the defaults.
pub fn install_args(
    packages: &[String],
    options: Option<&[String]>,
) -> Result<Vec<String>, AgentError> {
    if packages.is_empty() {
        return Err(AgentError::InvalidArgument(
            "at least one package is required".to_string(),
        ));
    }
    for pkg in packages {
        validate_package_name(pkg)?;
    }
    let mut args = vec!["--assume-yes".to_string()];
    match options {
        Some(opts) => args.extend(opts.iter().cloned()),
        None => args.extend(default_options()),
    }
    args.push("install".to_string());
    args.extend(packages.iter().cloned());
    Ok(args)
}

pub fn install(
    runner: &dyn CommandRunner,
    packages: &[String],
    options: Option<&[String]>,
) -> Result<(), AgentError> {
    let args = install_args(packages, options)?;
    tracing::info!(
        packages = %packages.join(","),
        options = ?options.map(|o| o.to_vec()).unwrap_or_else(default_options),
        "installing apt packages"
    );
    let output = runner.run(HostCapability::PackageInstall, APT_BIN, &args)?;
    external_action::ensure_success(APT_BIN, &args, output)?;
    Ok(())
}
