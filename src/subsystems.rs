//! Subsystem registration: DB initialization and schema discovery.
//!
//! Adding a new subsystem: append one entry to `SUBSYSTEMS`.

use crate::core::{broker, db, error, external_action};
use crate::plugins::{charm, deferred, readiness, snap};
use std::path::Path;

pub(crate) struct Subsystem {
    pub name: &'static str,
    pub initialize_db: Option<fn(&Path) -> Result<(), error::AgentError>>,
    pub schema: fn() -> serde_json::Value,
}

pub(crate) const SUBSYSTEMS: &[Subsystem] = &[
    Subsystem { name: "broker", initialize_db: Some(db::initialize_agent_db), schema: broker::schema },
    Subsystem { name: "external_action", initialize_db: None, schema: external_action::schema },
    Subsystem { name: "snap", initialize_db: None, schema: snap::schema },
    Subsystem { name: "readiness", initialize_db: None, schema: readiness::schema },
    Subsystem { name: "deferred", initialize_db: None, schema: deferred::schema },
    Subsystem { name: "charm", initialize_db: None, schema: charm::schema },
];

/// Initialize all subsystem databases sequentially.
pub(crate) fn initialize_all_dbs(data_root: &Path) -> Result<(), error::AgentError> {
    for sub in SUBSYSTEMS {
        if let Some(init) = sub.initialize_db {
            init(data_root)?;
        }
    }
    Ok(())
}

/// Schema documents for every subsystem, optionally filtered by name.
pub(crate) fn schemas(filter: Option<&str>) -> serde_json::Value {
    let entries: serde_json::Map<String, serde_json::Value> = SUBSYSTEMS
        .iter()
        .filter(|s| filter.is_none_or(|f| f == s.name))
        .map(|s| (s.name.to_string(), (s.schema)()))
        .collect();
    serde_json::Value::Object(entries)
}
