// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed storage for records and the mutation queue.
//!
//! One database file holds every tenant's data; both tables lead with a
//! `tenant` column, and all access goes through a [`TenantDb`] whose tenant
//! is fixed at construction.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

use crate::clock::ClockSource;
use crate::error::{Error, Result};
use crate::queue::MutationQueue;
use crate::store::RecordStore;
use crate::tenant::TenantKey;

/// Schema version stamped into `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// SQL schema for the local sync database.
pub const SCHEMA: &str = r#"
-- Optimistic local copies of domain records
CREATE TABLE IF NOT EXISTS records (
    tenant TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    id TEXT NOT NULL,
    payload TEXT NOT NULL,
    sync_status TEXT NOT NULL DEFAULT 'pending',
    last_modified TEXT NOT NULL,
    PRIMARY KEY (tenant, entity_type, id)
);

-- Durable log of mutations awaiting the server
CREATE TABLE IF NOT EXISTS queue (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    tenant TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    target_id TEXT NOT NULL,
    operation TEXT NOT NULL,
    payload TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    attempts INTEGER NOT NULL DEFAULT 0,
    terminal INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    next_attempt_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_records_partition ON records(tenant, entity_type);
CREATE INDEX IF NOT EXISTS idx_records_status ON records(tenant, sync_status);
CREATE INDEX IF NOT EXISTS idx_queue_status ON queue(tenant, status);
CREATE INDEX IF NOT EXISTS idx_queue_lineage ON queue(tenant, entity_type, target_id);
"#;

/// Parse a string value from the database, returning a rusqlite error on parse failure.
pub(crate) fn parse_db<T: std::str::FromStr>(
    value: &str,
    column: &str,
) -> std::result::Result<T, rusqlite::Error> {
    value.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(Error::CorruptedData(format!(
                "invalid value '{value}' in column '{column}'"
            ))),
        )
    })
}

/// Parse an RFC3339 timestamp from the database.
pub(crate) fn parse_timestamp(
    value: &str,
    column: &str,
) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(Error::CorruptedData(format!(
                    "invalid timestamp '{value}' in column '{column}'"
                ))),
            )
        })
}

/// Parse a JSON column from the database.
pub(crate) fn parse_json(
    value: &str,
    column: &str,
) -> std::result::Result<serde_json::Value, rusqlite::Error> {
    serde_json::from_str(value).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(Error::CorruptedData(format!(
                "invalid JSON in column '{column}'"
            ))),
        )
    })
}

/// Apply the schema, refusing databases written by a newer version.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(Error::CorruptedData(format!(
            "database schema v{version} is newer than supported v{SCHEMA_VERSION}"
        )));
    }
    conn.execute_batch(SCHEMA)?;
    if version < SCHEMA_VERSION {
        conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))?;
    }
    Ok(())
}

/// SQLite connection holding the local sync tables.
pub struct Database {
    /// The underlying SQLite connection.
    pub conn: Connection,
}

impl Database {
    /// Open a database connection at the given path, creating and migrating if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // WAL for concurrent readers; FULL so a committed append survives power loss
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;
             PRAGMA busy_timeout = 5000;",
        )?;

        let db = Database { conn };
        run_migrations(&db.conn)?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        run_migrations(&db.conn)?;
        Ok(db)
    }
}

/// A database bound to one tenant.
///
/// The only way to reach the record store and the mutation queue; both
/// views inherit the tenant key and clock from here.
pub struct TenantDb {
    db: Database,
    tenant: TenantKey,
    clock: Arc<dyn ClockSource>,
}

impl TenantDb {
    pub fn new(db: Database, tenant: TenantKey, clock: Arc<dyn ClockSource>) -> Self {
        TenantDb { db, tenant, clock }
    }

    pub fn tenant(&self) -> &TenantKey {
        &self.tenant
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The tenant's record store.
    pub fn records(&self) -> RecordStore<'_> {
        RecordStore::new(&self.db.conn, &self.tenant, self.clock.as_ref())
    }

    /// The tenant's mutation queue.
    pub fn queue(&self) -> MutationQueue<'_> {
        MutationQueue::new(&self.db.conn, &self.tenant, self.clock.as_ref())
    }

    /// Runs `f` inside one SQLite transaction.
    ///
    /// Either every write made through the two views commits, or none does.
    pub fn atomically<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&RecordStore<'_>, &MutationQueue<'_>) -> Result<T>,
    {
        let tx = self.db.conn.transaction()?;
        let out = {
            let records = RecordStore::new(&tx, &self.tenant, self.clock.as_ref());
            let queue = MutationQueue::new(&tx, &self.tenant, self.clock.as_ref());
            f(&records, &queue)?
        };
        tx.commit()?;
        Ok(out)
    }
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;
