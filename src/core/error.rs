//! Error type shared by every subsystem.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Command `{command}` failed with exit code {code:?}: {output}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },
    #[error("Command `{command}` timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },
    #[error("Command denied: {0}")]
    CommandDenied(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
}
