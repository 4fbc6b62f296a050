use crate::core::db;
use crate::core::error::AgentError;
use crate::core::schemas;
use crate::core::time;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Unit name reported by Juju to hook processes.
pub const UNIT_NAME_ENV: &str = "JUJU_UNIT_NAME";

/// Every read-modify-write against `agent.db` goes through the broker, which
/// serializes access in-process and appends an audit line per operation.
pub struct DbBroker {
    audit_log_path: PathBuf,
    unit: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BrokerEvent {
    pub ts: String,
    pub event_id: String,
    pub unit: String,
    pub op: String,
    pub db_id: String,
    pub status: String,
}

impl DbBroker {
    pub fn new(root: &Path) -> Self {
        Self {
            audit_log_path: root.join(schemas::BROKER_EVENTS_FILE),
            unit: std::env::var(UNIT_NAME_ENV).unwrap_or_else(|_| "local".to_string()),
        }
    }

    /// Execute a closure with a serialized connection to the specified DB.
    pub fn with_conn<F, R>(&self, db_path: &Path, op_name: &str, f: F) -> Result<R, AgentError>
    where
        F: FnOnce(&Connection) -> Result<R, AgentError>,
    {
        static DB_LOCK: Mutex<()> = Mutex::new(());
        let _lock = DB_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let db_id = db_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let conn = db::db_connect(&db_path.to_string_lossy())?;

        let result = f(&conn);

        let status = if result.is_ok() { "success" } else { "error" };
        if let Err(e) = self.log_event(op_name, &db_id, status) {
            tracing::warn!(op = op_name, error = %e, "failed to append broker audit event");
        }

        result
    }

    fn log_event(&self, op: &str, db_id: &str, status: &str) -> Result<(), AgentError> {
        let ev = BrokerEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            unit: self.unit.clone(),
            op: op.to_string(),
            db_id: db_id.to_string(),
            status: status.to_string(),
        };
        let line = serde_json::to_string(&ev)
            .map_err(|e| AgentError::ValidationError(e.to_string()))?;

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.audit_log_path)
            .map_err(AgentError::IoError)?;
        writeln!(f, "{}", line).map_err(AgentError::IoError)?;
        Ok(())
    }
}

/// Read back the broker audit log, oldest first.
pub fn read_audit_log(root: &Path) -> Result<Vec<BrokerEvent>, AgentError> {
    let path = root.join(schemas::BROKER_EVENTS_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path).map_err(AgentError::IoError)?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(|e| AgentError::ValidationError(e.to_string())))
        .collect()
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "broker",
        "version": "0.1.0",
        "description": "Serialized, audited access to the agent state database",
        "storage": [schemas::AGENT_DB_NAME, schemas::BROKER_EVENTS_FILE]
    })
}
