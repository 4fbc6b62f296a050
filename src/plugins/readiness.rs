use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::AgentError;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};

/// Durable per-unit record. New fields must carry `#[serde(default)]` so rows
/// written by older agents keep loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReadinessState {
    #[serde(default)]
    pub ready: bool,
}

pub trait ReadinessStore {
    fn get(&self) -> Result<ReadinessState, AgentError>;
    fn set(&self, state: &ReadinessState) -> Result<(), AgentError>;
}

pub struct SqliteReadinessStore {
    store: Store,
}

impl SqliteReadinessStore {
    /// Attach to an already initialized `agent.db`.
    pub fn open(store: &Store) -> Result<Self, AgentError> {
        db::ensure_initialized(&store.root)?;
        Ok(Self {
            store: store.clone(),
        })
    }
}

impl ReadinessStore for SqliteReadinessStore {
    fn get(&self) -> Result<ReadinessState, AgentError> {
        let broker = DbBroker::new(&self.store.root);
        let db_path = db::agent_db_path(&self.store.root);

        let raw: Option<String> = broker.with_conn(&db_path, "readiness.get", |conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM unit_state WHERE key = ?1",
                    params![schemas::READINESS_KEY],
                    |row| row.get(0),
                )
                .optional()?)
        })?;

        match raw {
            None => Ok(ReadinessState::default()),
            Some(json) => serde_json::from_str(&json).map_err(|e| {
                AgentError::ValidationError(format!("corrupt readiness record: {}", e))
            }),
        }
    }

    fn set(&self, state: &ReadinessState) -> Result<(), AgentError> {
        let broker = DbBroker::new(&self.store.root);
        let db_path = db::agent_db_path(&self.store.root);
        let value =
            serde_json::to_string(state).map_err(|e| AgentError::ValidationError(e.to_string()))?;
        let now = time::now_epoch_z();

        broker.with_conn(&db_path, "readiness.set", |conn| {
            conn.execute(
                "INSERT INTO unit_state(key, value, updated_at) VALUES(?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![schemas::READINESS_KEY, value, now],
            )?;
            Ok(())
        })
    }
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "readiness",
        "version": "0.1.0",
        "description": "Durable flag recording that the node finished install and configuration",
        "fields": ["ready"],
        "storage": [schemas::AGENT_DB_NAME]
    })
}
