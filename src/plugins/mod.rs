//! Subsystems driven by lifecycle hooks.

pub mod apt;
pub mod charm;
pub mod deferred;
pub mod host;
pub mod juju_log;
pub mod readiness;
pub mod snap;
pub mod status;
