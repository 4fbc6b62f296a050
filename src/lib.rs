//! microk8s-agent: hook agent for a single MicroK8s unit.
//!
//! Juju runs the agent once per lifecycle hook. Each run replays events that
//! an earlier hook deferred, then handles the current one:
//!
//! - `install`: install the `microk8s` snap.
//! - `start`: if the snap is present, add the operator user to the admin
//!   group, install auxiliary packages, persist `ready = true` and report
//!   `active`; otherwise persist `ready = false` and defer.
//!
//! # Architecture
//!
//! - [`plugins::charm`]: the reconciler, its dispatch table and the hook runtime.
//! - [`plugins::host`]: host actions (snap, apt, group change, status, log).
//! - [`plugins::readiness`] / [`plugins::deferred`]: durable state in `agent.db`.
//! - [`core`]: errors, configuration, the DB broker and the host command runner.
//!
//! # Examples
//!
//! ```bash
//! # Run from a hook (or symlink hooks/start -> microk8s-agent)
//! microk8s-agent hook start
//!
//! # Inspect the unit
//! microk8s-agent status --format json
//! microk8s-agent deferred list
//! ```

pub mod core;
pub mod plugins;
mod subsystems;

use crate::core::{
    config::{self, AgentConfig},
    error::AgentError,
    external_action::SystemRunner,
    store::{self, Store},
};
use crate::plugins::{
    charm::{self, LifecycleEvent, NodePhase, Reconciler},
    deferred::{self, DeferredQueue},
    host::Host,
    readiness::{ReadinessStore, SqliteReadinessStore},
};

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable holding the tracing filter for the binary.
pub const LOG_ENV: &str = "MICROK8S_AGENT_LOG";

#[derive(Parser, Debug)]
#[clap(
    name = "microk8s-agent",
    version = env!("CARGO_PKG_VERSION"),
    about = "Install MicroK8s on a unit and track when it is ready"
)]
struct Cli {
    /// State directory (defaults to $MICROK8S_AGENT_STATE_DIR, then $JUJU_CHARM_DIR/.microk8s-agent).
    #[clap(long, global = true)]
    state_dir: Option<PathBuf>,
    /// Config file (defaults to $JUJU_CHARM_DIR/agent.toml when present).
    #[clap(long, global = true)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Handle one lifecycle hook
    Hook {
        /// Hook name: install | start
        event: String,
    },

    /// Show readiness, node phase and pending deferred events
    Status {
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },

    /// Events waiting for redelivery
    Deferred(deferred::DeferredCli),

    /// Subsystem schemas and discovery
    Schema {
        /// Optional: filter by subsystem name
        #[clap(long)]
        subsystem: Option<String>,
    },

    /// Show version information
    Version,
}

/// Everything a command needs, resolved once per process.
pub struct AgentContext {
    pub store: Store,
    pub config: AgentConfig,
}

impl AgentContext {
    pub fn open(state_dir: Option<&Path>, config_path: Option<&Path>) -> Result<Self, AgentError> {
        let charm_dir = std::env::var(config::CHARM_DIR_ENV).ok();
        let env_state_dir = std::env::var(store::STATE_DIR_ENV).ok();
        let cwd = std::env::current_dir()?;

        let config = config::load_config(config_path, charm_dir.as_deref())?;
        let root = store::resolve_state_dir(
            state_dir,
            env_state_dir.as_deref(),
            charm_dir.as_deref(),
            &cwd,
        );
        let store = Store::open(root)?;
        subsystems::initialize_all_dbs(&store.root)?;
        Ok(Self { store, config })
    }

    pub fn host(&self) -> Host<SystemRunner> {
        Host::new(
            SystemRunner::new(&self.store.root, self.config.command_timeout()),
            self.config.use_sudo,
        )
    }
}

/// Hook name implied by the executable name, e.g. `hooks/start` symlinked to
/// the agent binary.
pub fn hook_from_argv0(arg0: Option<&OsString>) -> Option<LifecycleEvent> {
    let arg0 = arg0?;
    Path::new(arg0).file_name()?.to_str()?.parse().ok()
}

pub fn run_hook_command(ctx: &AgentContext, event: LifecycleEvent) -> Result<(), AgentError> {
    let host = ctx.host();
    let readiness = SqliteReadinessStore::open(&ctx.store)?;
    let queue = DeferredQueue::open(&ctx.store)?;
    let reconciler = Reconciler::new(&host, &readiness, &ctx.config);

    tracing::info!(event = %event, state_dir = %ctx.store.root.display(), "handling hook");
    let report = charm::run_hook(&reconciler, &queue, event)?;
    tracing::info!(
        event = %report.event,
        disposition = ?report.disposition,
        replayed = report.replayed.len(),
        "hook finished"
    );
    Ok(())
}

fn run_status_command(ctx: &AgentContext, format: &str) -> Result<(), AgentError> {
    let host = ctx.host();
    let readiness = SqliteReadinessStore::open(&ctx.store)?;
    let queue = DeferredQueue::open(&ctx.store)?;
    let reconciler = Reconciler::new(&host, &readiness, &ctx.config);

    let ready = readiness.get()?.ready;
    // Outside a unit the snap tool may be missing; the phase is then unknown.
    let phase = match reconciler.phase() {
        Ok(phase) => Some(phase),
        Err(e) => {
            tracing::debug!(error = %e, "could not determine node phase");
            None
        }
    };
    let pending = queue.pending()?;

    match format {
        "json" => {
            let value = serde_json::json!({
                "package": ctx.config.package,
                "ready": ready,
                "phase": phase,
                "deferred": pending,
                "state_dir": ctx.store.root,
            });
            let out = serde_json::to_string_pretty(&value)
                .map_err(|e| AgentError::ValidationError(e.to_string()))?;
            println!("{}", out);
        }
        "text" => {
            let ready_label = if ready {
                "ready".bright_green().bold()
            } else {
                "not ready".bright_yellow().bold()
            };
            let phase_label = match phase {
                Some(NodePhase::Uninstalled) => "uninstalled",
                Some(NodePhase::InstalledUnconfigured) => "installed, unconfigured",
                Some(NodePhase::Ready) => "ready",
                None => "unknown",
            };
            println!("{} {}", "▸".bright_cyan(), ctx.config.package.bold());
            println!("  readiness: {}", ready_label);
            println!("  phase:     {}", phase_label);
            println!("  deferred:  {}", pending.len());
            for ev in &pending {
                println!(
                    "    - {} (attempts: {}, since {})",
                    ev.kind, ev.attempts, ev.deferred_at
                );
            }
        }
        other => {
            return Err(AgentError::InvalidArgument(format!(
                "unknown format '{}': expected 'text' or 'json'",
                other
            )));
        }
    }
    Ok(())
}

pub fn run() -> Result<(), AgentError> {
    if let Some(event) = hook_from_argv0(std::env::args_os().next().as_ref()) {
        let ctx = AgentContext::open(None, None)?;
        return run_hook_command(&ctx, event);
    }

    let cli = Cli::parse();

    match cli.command {
        Command::Version => {
            println!("v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Schema { subsystem } => {
            let value = subsystems::schemas(subsystem.as_deref());
            let out = serde_json::to_string_pretty(&value)
                .map_err(|e| AgentError::ValidationError(e.to_string()))?;
            println!("{}", out);
            Ok(())
        }
        Command::Hook { event } => {
            let event: LifecycleEvent = event.parse()?;
            let ctx = AgentContext::open(cli.state_dir.as_deref(), cli.config.as_deref())?;
            run_hook_command(&ctx, event)
        }
        Command::Status { format } => {
            let ctx = AgentContext::open(cli.state_dir.as_deref(), cli.config.as_deref())?;
            run_status_command(&ctx, &format)
        }
        Command::Deferred(deferred_cli) => {
            let ctx = AgentContext::open(cli.state_dir.as_deref(), cli.config.as_deref())?;
            deferred::run_deferred_cli(&ctx.store, deferred_cli)
        }
    }
}
