//! Orchestrator log sink (`juju-log`).

use crate::core::external_action::{CommandRunner, HostCapability};
use tracing::Level;

const JUJU_LOG_BIN: &str = "juju-log";

/// Linux `MAX_ARG_STRLEN` (PAGE_SIZE * 32): longest single argv entry.
pub const MAX_ARG_STRLEN: usize = 131072;

/// Cut `message` to at most `MAX_ARG_STRLEN` bytes without splitting a char.
pub fn truncate_message(message: &str) -> &str {
    if message.len() <= MAX_ARG_STRLEN {
        return message;
    }
    let mut end = MAX_ARG_STRLEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    &message[..end]
}

pub fn log_args(message: &str, level: Option<&str>) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(level) = level.filter(|l| !l.is_empty()) {
        args.push("-l".to_string());
        args.push(level.to_string());
    }
    args.push(truncate_message(message).to_string());
    args
}

/// Tracing level matching a `juju-log -l` level; unknown levels map to INFO.
pub fn tracing_level(level: Option<&str>) -> Level {
    match level.map(str::to_ascii_uppercase).as_deref() {
        Some("ERROR") | Some("CRITICAL") => Level::ERROR,
        Some("WARNING") | Some("WARN") => Level::WARN,
        Some("DEBUG") => Level::DEBUG,
        Some("TRACE") => Level::TRACE,
        _ => Level::INFO,
    }
}

fn mirror(message: &str, level: Option<&str>) {
    let level = tracing_level(level);
    if level == Level::ERROR {
        tracing::error!("{}", message);
    } else if level == Level::WARN {
        tracing::warn!("{}", message);
    } else if level == Level::DEBUG {
        tracing::debug!("{}", message);
    } else if level == Level::TRACE {
        tracing::trace!("{}", message);
    } else {
        tracing::info!("{}", message);
    }
}

/// Send a record to the unit log. Never fails: outside a hook context the
/// tool is missing, and the record still reaches the local tracing output.
pub fn juju_log(runner: &dyn CommandRunner, message: &str, level: Option<&str>) {
    mirror(message, level);
    let args = log_args(message, level);
    match runner.run(HostCapability::HookLog, JUJU_LOG_BIN, &args) {
        Ok(out) if !out.success() => {
            tracing::warn!(code = ?out.code, "juju-log exited non-zero");
        }
        Ok(_) => {}
        Err(e) => tracing::debug!(error = %e, "juju-log unavailable"),
    }
}
