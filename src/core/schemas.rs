//! Database schema definitions for the agent store.
//!
//! All durable state lives in a single SQLite file, `agent.db`:
//! - `unit_state`: key/value rows; the readiness record is one JSON value.
//! - `deferred_events`: lifecycle events waiting for redelivery.

pub const AGENT_DB_NAME: &str = "agent.db";

pub const AGENT_DB_SCHEMA_UNIT_STATE: &str = "
    CREATE TABLE IF NOT EXISTS unit_state (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
";

pub const AGENT_DB_SCHEMA_DEFERRED_EVENTS: &str = "
    CREATE TABLE IF NOT EXISTS deferred_events (
        event_id TEXT PRIMARY KEY,
        kind TEXT NOT NULL UNIQUE,
        deferred_at TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 1
    )
";

/// Key of the readiness record in `unit_state`.
pub const READINESS_KEY: &str = "readiness";

pub const BROKER_EVENTS_FILE: &str = "broker.events.jsonl";
pub const HOST_ACTION_EVENTS_FILE: &str = "host_actions.events.jsonl";
