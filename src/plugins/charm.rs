//! Install/start reconciliation for a single MicroK8s unit.
//!
//! The reconciler owns the only decisions the agent makes: install
//! unconditionally on `install`; on `start`, either wait for the snap
//! (mark not ready and defer) or configure the host and declare the unit
//! ready. Host effects and persistence are injected so the decisions can be
//! tested without touching the machine.
//!
//! | Current | Event | Snap present? | Action | Next |
//! |---|---|---|---|---|
//! | any | Install | - | install snap | unchanged |
//! | not ready | Start | no | mark not ready, defer | unchanged |
//! | any | Start | yes | configure, mark ready, report active | Ready |
//! | any | Start | yes, group change fails (block) | report blocked, defer | unchanged |

use crate::core::config::{AgentConfig, GroupFailurePolicy};
use crate::core::error::AgentError;
use crate::plugins::deferred::DeferredQueue;
use crate::plugins::host::HostActions;
use crate::plugins::readiness::{ReadinessState, ReadinessStore};
use crate::plugins::status::WorkloadState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEvent {
    Install,
    Start,
}

impl LifecycleEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleEvent::Install => "install",
            LifecycleEvent::Start => "start",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleEvent {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "install" => Ok(LifecycleEvent::Install),
            "start" => Ok(LifecycleEvent::Start),
            other => Err(AgentError::InvalidArgument(format!(
                "'{}' is not a handled lifecycle event",
                other
            ))),
        }
    }
}

/// Result of handling one event.
#[derive(Debug)]
pub enum HandlerOutcome {
    Completed,
    /// Redeliver the same event later; not an error.
    Deferred,
    Failed(AgentError),
}

/// Derived from the snap presence and the readiness flag; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodePhase {
    Uninstalled,
    InstalledUnconfigured,
    Ready,
}

impl NodePhase {
    pub fn derive(installed: bool, ready: bool) -> Self {
        match (installed, ready) {
            (false, _) => NodePhase::Uninstalled,
            (true, false) => NodePhase::InstalledUnconfigured,
            (true, true) => NodePhase::Ready,
        }
    }
}

pub struct Reconciler<'a> {
    host: &'a dyn HostActions,
    readiness: &'a dyn ReadinessStore,
    config: &'a AgentConfig,
}

type HandlerFn = fn(&Reconciler<'_>) -> Result<HandlerOutcome, AgentError>;

pub struct EventHandler {
    pub event: LifecycleEvent,
    handle: HandlerFn,
}

/// Every handled event and its handler. Adding an event: append one entry.
pub const HANDLERS: &[EventHandler] = &[
    EventHandler {
        event: LifecycleEvent::Install,
        handle: on_install,
    },
    EventHandler {
        event: LifecycleEvent::Start,
        handle: on_start,
    },
];

impl<'a> Reconciler<'a> {
    pub fn new(
        host: &'a dyn HostActions,
        readiness: &'a dyn ReadinessStore,
        config: &'a AgentConfig,
    ) -> Self {
        Self {
            host,
            readiness,
            config,
        }
    }

    pub fn handle_install(&self) -> Result<HandlerOutcome, AgentError> {
        on_install(self)
    }

    pub fn handle_start(&self) -> Result<HandlerOutcome, AgentError> {
        on_start(self)
    }

    /// Route `event` through the handler table.
    pub fn dispatch(&self, event: LifecycleEvent) -> HandlerOutcome {
        let Some(handler) = HANDLERS.iter().find(|h| h.event == event) else {
            return HandlerOutcome::Failed(AgentError::NotFound(format!(
                "no handler registered for '{}'",
                event
            )));
        };
        match (handler.handle)(self) {
            Ok(outcome) => outcome,
            Err(e) => HandlerOutcome::Failed(e),
        }
    }

    pub fn phase(&self) -> Result<NodePhase, AgentError> {
        let installed = self.host.is_snap_installed(&self.config.package)?;
        let ready = self.readiness.get()?.ready;
        Ok(NodePhase::derive(installed, ready))
    }
}

fn on_install(r: &Reconciler<'_>) -> Result<HandlerOutcome, AgentError> {
    let cfg = r.config;
    r.host.install_snap(&cfg.package, &cfg.snap)?;
    r.host.log("on_install: installing", None);
    Ok(HandlerOutcome::Completed)
}

fn on_start(r: &Reconciler<'_>) -> Result<HandlerOutcome, AgentError> {
    let cfg = r.config;
    r.host.log("on_start: starting", None);

    if !r.host.is_snap_installed(&cfg.package)? {
        r.readiness.set(&ReadinessState { ready: false })?;
        tracing::info!(snap = %cfg.package, "snap not installed yet; deferring start");
        return Ok(HandlerOutcome::Deferred);
    }

    if let Err(e) = r.host.add_user_to_group(&cfg.operator_user, &cfg.admin_group) {
        let message = format!(
            "failed to add {} to group {}: {}",
            cfg.operator_user, cfg.admin_group, e
        );
        r.host.log(&message, Some("WARNING"));
        if cfg.group_failure == GroupFailurePolicy::Block {
            r.host.report_status(
                WorkloadState::Blocked.as_str(),
                &format!("cannot add {} to {}", cfg.operator_user, cfg.admin_group),
            )?;
            // Retried on the next hook; the readiness flag is left as it was.
            return Ok(HandlerOutcome::Deferred);
        }
    }

    if !cfg.auxiliary_packages.is_empty() {
        r.host
            .install_packages(&cfg.auxiliary_packages, cfg.apt_options.as_deref())?;
    }

    // Readiness is only written once every configuration step has succeeded.
    r.readiness.set(&ReadinessState { ready: true })?;
    r.host
        .report_status(WorkloadState::Active.as_str(), &cfg.ready_message)?;
    Ok(HandlerOutcome::Completed)
}

/// What happened to one event during a hook run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Completed,
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookReport {
    pub event: LifecycleEvent,
    pub disposition: Disposition,
    pub replayed: Vec<(LifecycleEvent, Disposition)>,
}

/// Run one hook: replay previously deferred events first, then dispatch
/// `event`. A failure aborts the run and leaves the failing event queued.
pub fn run_hook(
    reconciler: &Reconciler<'_>,
    queue: &DeferredQueue,
    event: LifecycleEvent,
) -> Result<HookReport, AgentError> {
    let mut replayed = Vec::new();
    for pending in queue.pending()? {
        // The current dispatch below covers it.
        if pending.kind == event {
            continue;
        }
        tracing::info!(event = %pending.kind, attempts = pending.attempts, "replaying deferred event");
        let disposition = settle(queue, pending.kind, reconciler.dispatch(pending.kind))?;
        replayed.push((pending.kind, disposition));
    }

    let disposition = settle(queue, event, reconciler.dispatch(event))?;
    Ok(HookReport {
        event,
        disposition,
        replayed,
    })
}

fn settle(
    queue: &DeferredQueue,
    event: LifecycleEvent,
    outcome: HandlerOutcome,
) -> Result<Disposition, AgentError> {
    match outcome {
        HandlerOutcome::Completed => {
            queue.complete(event)?;
            Ok(Disposition::Completed)
        }
        HandlerOutcome::Deferred => {
            queue.defer(event)?;
            Ok(Disposition::Deferred)
        }
        HandlerOutcome::Failed(e) => {
            tracing::error!(event = %event, error = %e, "handler failed");
            Err(e)
        }
    }
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "charm",
        "version": "0.1.0",
        "description": "Install/start reconciliation of the MicroK8s unit",
        "events": HANDLERS.iter().map(|h| h.event.as_str()).collect::<Vec<_>>(),
        "phases": ["uninstalled", "installed_unconfigured", "ready"],
        "outcomes": ["completed", "deferred", "failed"]
    })
}
