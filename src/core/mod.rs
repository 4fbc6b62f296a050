//! Core primitives shared by every subsystem: errors, configuration, the
//! state store and its broker, and the host command runner.

pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod external_action;
pub mod schemas;
pub mod store;
pub mod time;
