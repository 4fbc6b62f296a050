use crate::core::error::AgentError;
use crate::core::schemas;
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// What a host command is allowed to do. Each capability maps to a fixed set
/// of binaries; anything else is refused before spawning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostCapability {
    PackageInstall,
    SnapInstall,
    SnapQuery,
    GroupChange,
    StatusReport,
    HookLog,
}

impl HostCapability {
    pub fn as_str(self) -> &'static str {
        match self {
            HostCapability::PackageInstall => "package_install",
            HostCapability::SnapInstall => "snap_install",
            HostCapability::SnapQuery => "snap_query",
            HostCapability::GroupChange => "group_change",
            HostCapability::StatusReport => "status_report",
            HostCapability::HookLog => "hook_log",
        }
    }

    fn allowed_bins(self) -> &'static [&'static str] {
        match self {
            HostCapability::PackageInstall => &["apt-get"],
            HostCapability::SnapInstall | HostCapability::SnapQuery => &["snap"],
            HostCapability::GroupChange => &["usermod", "sudo"],
            HostCapability::StatusReport => &["status-set"],
            HostCapability::HookLog => &["juju-log"],
        }
    }
}

/// Captured result of one host command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr, for diagnostics.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (_, true) => self.stdout.trim().to_string(),
            (true, false) => self.stderr.trim().to_string(),
            (false, false) => format!("{}\n{}", self.stdout.trim(), self.stderr.trim()),
        }
    }
}

/// Seam between the host actions and the process table. The production
/// runner spawns real processes; tests substitute recorders.
pub trait CommandRunner {
    fn run(
        &self,
        capability: HostCapability,
        program: &str,
        args: &[String],
    ) -> Result<CommandOutput, AgentError>;
}

/// Turn a non-zero exit into `CommandFailed`.
pub fn ensure_success(
    program: &str,
    args: &[String],
    output: CommandOutput,
) -> Result<CommandOutput, AgentError> {
    if output.success() {
        return Ok(output);
    }
    Err(AgentError::CommandFailed {
        command: command_line(program, args),
        code: output.code,
        output: output.combined(),
    })
}

pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program.to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn command_bin(command: &str) -> String {
    Path::new(command)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| command.to_string())
}

pub fn check_allowed(capability: HostCapability, program: &str) -> Result<(), AgentError> {
    let bin = command_bin(program);
    if capability.allowed_bins().iter().any(|b| *b == bin) {
        return Ok(());
    }
    Err(AgentError::CommandDenied(format!(
        "capability '{}' does not allow binary '{}'",
        capability.as_str(),
        bin
    )))
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HostActionEvent {
    pub ts: String,
    pub event_id: String,
    pub capability: String,
    pub command: String,
    pub args: Vec<String>,
    pub status: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

/// Spawns host commands with a hard timeout and appends every invocation to
/// `host_actions.events.jsonl` in the store.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    store_root: PathBuf,
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(store_root: &Path, timeout: Duration) -> Self {
        Self {
            store_root: store_root.to_path_buf(),
            timeout,
        }
    }

    fn log_event(&self, event: &HostActionEvent) -> Result<(), AgentError> {
        let path = self.store_root.join(schemas::HOST_ACTION_EVENTS_FILE);
        let line = serde_json::to_string(event)
            .map_err(|e| AgentError::ValidationError(e.to_string()))?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(AgentError::IoError)?;
        writeln!(f, "{}", line).map_err(AgentError::IoError)
    }
}

impl CommandRunner for SystemRunner {
    fn run(
        &self,
        capability: HostCapability,
        program: &str,
        args: &[String],
    ) -> Result<CommandOutput, AgentError> {
        check_allowed(capability, program)?;
        tracing::debug!(
            capability = capability.as_str(),
            command = %command_line(program, args),
            "running host command"
        );

        let start = Instant::now();
        let result = execute_with_timeout(program, args, self.timeout);
        let (status, exit_code) = match &result {
            Ok(out) if out.success() => ("success", out.code),
            Ok(out) => ("error", out.code),
            Err(AgentError::Timeout { .. }) => ("timeout", None),
            Err(_) => ("spawn_error", None),
        };

        let event = HostActionEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            capability: capability.as_str().to_string(),
            command: program.to_string(),
            args: args.to_vec(),
            status: status.to_string(),
            exit_code,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        if let Err(e) = self.log_event(&event) {
            tracing::warn!(error = %e, "failed to append host action event");
        }

        result
    }
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut r) = reader {
            let _ = r.read_to_end(&mut buf);
        }
        let _ = tx.send(String::from_utf8_lossy(&buf).to_string());
    });
    rx
}

/// Kill the child's whole process group, including anything it left running
/// in the background, then reap the child.
fn kill_process_group(child: &mut Child) {
    let pgid = child.id() as libc::pid_t;
    let _ = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    let _ = child.kill();
    let _ = child.wait();
}

/// Run `program` to completion, killing it once `timeout` elapses.
///
/// The deadline covers both the exit of the child and the draining of its
/// output: a background process that keeps stdout or stderr open counts
/// against the same budget.
pub fn execute_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<CommandOutput, AgentError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .map_err(AgentError::IoError)?;

    // Pipes are drained concurrently so a chatty child cannot block on a full pipe.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let timed_out = |child: &mut Child| {
        kill_process_group(child);
        AgentError::Timeout {
            command: command_line(program, args),
            seconds: timeout.as_secs(),
        }
    };

    let status = loop {
        if let Some(status) = child.try_wait().map_err(AgentError::IoError)? {
            break status;
        }
        if Instant::now() >= deadline {
            return Err(timed_out(&mut child));
        }
        thread::sleep(Duration::from_millis(50));
    };

    let mut collected = Vec::with_capacity(2);
    for rx in [&stdout, &stderr] {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(text) => collected.push(text),
            Err(mpsc::RecvTimeoutError::Disconnected) => collected.push(String::new()),
            Err(mpsc::RecvTimeoutError::Timeout) => return Err(timed_out(&mut child)),
        }
    }
    let stderr = collected.pop().unwrap_or_default();
    let stdout = collected.pop().unwrap_or_default();

    Ok(CommandOutput {
        code: status.code(),
        stdout,
        stderr,
    })
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "external_action",
        "version": "0.1.0",
        "description": "Capability-scoped runner for host commands with default-deny allowlists and timeouts",
        "capabilities": [
            "package_install",
            "snap_install",
            "snap_query",
            "group_change",
            "status_report",
            "hook_log"
        ],
        "storage": [schemas::HOST_ACTION_EVENTS_FILE]
    })
}
