use crate::core::broker::DbBroker;
use crate::core::error::AgentError;
use crate::core::schemas;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};

pub fn db_connect(db_path: &str) -> Result<Connection, AgentError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(AgentError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(AgentError::RusqliteError)?;
    Ok(conn)
}

pub fn agent_db_path(root: &Path) -> PathBuf {
    root.join(schemas::AGENT_DB_NAME)
}

pub fn initialize_agent_db(root: &Path) -> Result<(), AgentError> {
    fs::create_dir_all(root).map_err(AgentError::IoError)?;
    let db_path = agent_db_path(root);

    let broker = DbBroker::new(root);
    broker.with_conn(&db_path, "agent.init", |conn| {
        conn.execute(schemas::AGENT_DB_SCHEMA_UNIT_STATE, [])?;
        conn.execute(schemas::AGENT_DB_SCHEMA_DEFERRED_EVENTS, [])?;
        Ok(())
    })
}

/// Fail unless `agent.db` exists. Initialization happens once per process,
/// when the agent context is opened.
pub fn ensure_initialized(root: &Path) -> Result<(), AgentError> {
    let db_path = agent_db_path(root);
    if db_path.exists() {
        return Ok(());
    }
    Err(AgentError::NotFound(format!(
        "state database {} is not initialized",
        db_path.display()
    )))
}
