//! Deferred lifecycle events.
//!
//! A handler that cannot finish yet returns `Deferred`; the event is recorded
//! here and re-dispatched at the start of the next hook invocation. At most
//! one row exists per event kind; deferring again bumps `attempts`.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::AgentError;
use crate::core::schemas;
use crate::core::store::Store;
use crate::core::time;
use crate::plugins::charm::LifecycleEvent;
use clap::{Parser, Subcommand};
use rusqlite::params;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredEvent {
    pub event_id: String,
    pub kind: LifecycleEvent,
    pub deferred_at: String,
    pub attempts: i64,
}

pub struct DeferredQueue {
    store: Store,
}

impl DeferredQueue {
    /// Attach to an already initialized `agent.db`.
    pub fn open(store: &Store) -> Result<Self, AgentError> {
        db::ensure_initialized(&store.root)?;
        Ok(Self {
            store: store.clone(),
        })
    }

    fn broker(&self) -> (DbBroker, std::path::PathBuf) {
        (
            DbBroker::new(&self.store.root),
            db::agent_db_path(&self.store.root),
        )
    }

    /// Record `event` for redelivery, or bump the attempt count of the
    /// pending row for that kind.
    pub fn defer(&self, event: LifecycleEvent) -> Result<DeferredEvent, AgentError> {
        let (broker, db_path) = self.broker();
        let event_id = time::new_event_id();
        let now = time::now_epoch_z();

        let row = broker.with_conn(&db_path, "deferred.defer", |conn| {
            conn.execute(
                "INSERT INTO deferred_events(event_id, kind, deferred_at, attempts) VALUES(?1, ?2, ?3, 1)
                 ON CONFLICT(kind) DO UPDATE SET attempts = attempts + 1",
                params![event_id, event.as_str(), now],
            )?;
            let row = conn.query_row(
                "SELECT event_id, kind, deferred_at, attempts FROM deferred_events WHERE kind = ?1",
                params![event.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )?;
            Ok(row)
        })?;

        let deferred = to_event(row)?;
        tracing::info!(
            event = %deferred.kind,
            attempts = deferred.attempts,
            "event deferred for redelivery"
        );
        Ok(deferred)
    }

    /// Pending events in the order they were first deferred.
    pub fn pending(&self) -> Result<Vec<DeferredEvent>, AgentError> {
        let (broker, db_path) = self.broker();
        let rows = broker.with_conn(&db_path, "deferred.pending", |conn| {
            let mut stmt = conn.prepare(
                "SELECT event_id, kind, deferred_at, attempts FROM deferred_events ORDER BY rowid",
            )?;
            let iter = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?;
            iter.collect::<Result<Vec<_>, _>>()
                .map_err(AgentError::RusqliteError)
        })?;
        rows.into_iter().map(to_event).collect()
    }

    /// Drop the pending row for `event`. Returns whether one existed.
    pub fn complete(&self, event: LifecycleEvent) -> Result<bool, AgentError> {
        let (broker, db_path) = self.broker();
        let removed = broker.with_conn(&db_path, "deferred.complete", |conn| {
            Ok(conn.execute(
                "DELETE FROM deferred_events WHERE kind = ?1",
                params![event.as_str()],
            )?)
        })?;
        Ok(removed > 0)
    }

    pub fn clear(&self) -> Result<usize, AgentError> {
        let (broker, db_path) = self.broker();
        broker.with_conn(&db_path, "deferred.clear", |conn| {
            Ok(conn.execute("DELETE FROM deferred_events", [])?)
        })
    }
}

fn to_event(row: (String, String, String, i64)) -> Result<DeferredEvent, AgentError> {
    let (event_id, kind, deferred_at, attempts) = row;
    Ok(DeferredEvent {
        event_id,
        kind: kind.parse()?,
        deferred_at,
        attempts,
    })
}

#[derive(Parser, Debug)]
#[clap(name = "deferred", about = "Inspect events waiting for redelivery")]
pub struct DeferredCli {
    #[clap(subcommand)]
    pub command: DeferredCommand,
}

#[derive(Subcommand, Debug)]
pub enum DeferredCommand {
    /// List pending deferred events as JSON.
    List,
    /// Drop every pending deferred event.
    Clear,
}

pub fn run_deferred_cli(store: &Store, cli: DeferredCli) -> Result<(), AgentError> {
    let queue = DeferredQueue::open(store)?;
    match cli.command {
        DeferredCommand::List => {
            let pending = queue.pending()?;
            let out = serde_json::to_string_pretty(&pending)
                .map_err(|e| AgentError::ValidationError(e.to_string()))?;
            println!("{}", out);
        }
        DeferredCommand::Clear => {
            let removed = queue.clear()?;
            println!("Cleared {} deferred event(s)", removed);
        }
    }
    Ok(())
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "deferred",
        "version": "0.1.0",
        "description": "Lifecycle events waiting for redelivery on the next hook",
        "commands": [
            { "name": "list", "parameters": [] },
            { "name": "clear", "parameters": [] }
        ],
        "storage": [schemas::AGENT_DB_NAME]
    })
}
