// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Per-tenant sync session.
//!
//! A [`SyncSession`] owns the tenant's database handle behind a mutex and
//! hands out façades. There is no global instance: construct one per tenant
//! and pass it around; several sessions can coexist in one process.

use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use clinicsync_core::{
    ClockSource, Database, EntityType, Operation, QueueEntry, QueueStats, Result, SyncStatus,
    TenantDb, TenantKey, TenantResolver,
};

use super::facade::{Collection, Entity, TypedCollection};

/// Aggregate counts for status indicators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    /// Queue entries still expected to reach the server.
    pub pending_count: usize,
    /// Records that match what the server acknowledged.
    pub synced_count: usize,
    /// Entries that need a person: terminal failures.
    pub error_count: usize,
}

/// A fresh read of everything a status indicator shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub tenant: String,
    pub counters: Counters,
    pub queue: QueueStats,
}

/// Storage handle for one tenant. Clones share the same connection.
#[derive(Clone)]
pub struct SyncSession {
    db: Arc<Mutex<TenantDb>>,
    tenant: TenantKey,
}

impl SyncSession {
    /// Resolves `identifier` and opens the tenant's storage at `db_path`.
    ///
    /// Fails with `TenantUnavailable` unless the tenant is active.
    pub fn open(
        resolver: &dyn TenantResolver,
        identifier: &str,
        db_path: &Path,
        clock: Arc<dyn ClockSource>,
    ) -> Result<Self> {
        let tenant = resolver.resolve(identifier)?.into_active_key(identifier)?;
        let db = Database::open(db_path)?;
        Self::with_database(db, tenant, clock)
    }

    /// Wraps an already open database.
    ///
    /// Opening never touches the queue: entries another process holds
    /// `in_flight` stay with that process. See [`recover_in_flight`](Self::recover_in_flight).
    pub fn with_database(db: Database, tenant: TenantKey, clock: Arc<dyn ClockSource>) -> Result<Self> {
        Ok(SyncSession {
            db: Arc::new(Mutex::new(TenantDb::new(db, tenant.clone(), clock))),
            tenant,
        })
    }

    /// Returns entries a crashed drain left `in_flight` to `pending`.
    ///
    /// Only the owner of the tenant's drain may call this, before its first
    /// drain; anyone else would steal entries from a live request.
    pub fn recover_in_flight(&self) -> Result<usize> {
        let recovered = self.with_db(|db| db.queue().recover_in_flight())?;
        if recovered > 0 {
            tracing::warn!(tenant = %self.tenant, recovered, "requeued entries left in flight");
        }
        Ok(recovered)
    }

    pub fn tenant(&self) -> &TenantKey {
        &self.tenant
    }

    /// Runs `f` with exclusive access to the tenant's database.
    ///
    /// Never call this across an `.await`.
    pub fn with_db<T>(&self, f: impl FnOnce(&mut TenantDb) -> Result<T>) -> Result<T> {
        let mut db = self.db.lock().map_err(|_| {
            clinicsync_core::Error::Unavailable("session lock poisoned".to_string())
        })?;
        f(&mut *db)
    }

    /// Façade for one entity type.
    pub fn collection(&self, entity_type: EntityType) -> Collection {
        Collection::new(self.clone(), entity_type)
    }

    /// Typed façade for a domain struct.
    pub fn typed<E: Entity>(&self) -> Result<TypedCollection<E>> {
        let entity_type = EntityType::new(E::ENTITY_TYPE)?;
        Ok(TypedCollection::new(self.collection(entity_type)))
    }

    pub fn counters(&self) -> Result<Counters> {
        self.with_db(|db| {
            let queue = db.queue();
            let stats = queue.stats()?;
            let terminal = queue.list_failed()?.iter().filter(|e| e.terminal).count();
            let synced = db.records().counts()?.synced;
            Ok(Counters {
                pending_count: stats.pending + stats.in_flight + stats.failed.saturating_sub(terminal),
                synced_count: synced,
                error_count: terminal,
            })
        })
    }

    pub fn queue_stats(&self) -> Result<QueueStats> {
        self.with_db(|db| db.queue().stats())
    }

    /// Re-reads counters and queue stats, e.g. after another process wrote.
    pub fn refresh(&self) -> Result<StatusSnapshot> {
        Ok(StatusSnapshot {
            tenant: self.tenant.to_string(),
            counters: self.counters()?,
            queue: self.queue_stats()?,
        })
    }

    /// Entries not yet completed, in FIFO order.
    pub fn open_entries(&self) -> Result<Vec<QueueEntry>> {
        self.with_db(|db| db.queue().list_open())
    }

    pub fn failed_entries(&self) -> Result<Vec<QueueEntry>> {
        self.with_db(|db| db.queue().list_failed())
    }

    /// Manual retry of a failed entry with a fresh attempt budget.
    ///
    /// The target record, if any, goes back to `pending`.
    pub fn requeue(&self, entry_id: &str) -> Result<QueueEntry> {
        let entry = self.with_db(|db| {
            db.atomically(|records, queue| {
                let entry = queue.requeue(entry_id)?;
                if entry.operation != Operation::Delete {
                    records.set_status(&entry.entity_type, &entry.target_id, SyncStatus::Pending)?;
                }
                Ok(entry)
            })
        })?;
        tracing::info!(entry = entry_id, "entry requeued");
        Ok(entry)
    }

    /// Gives up on a failed entry. Discarding a create drops its whole
    /// lineage; the record itself stays local, in `error`.
    pub fn discard(&self, entry_id: &str) -> Result<QueueEntry> {
        let entry = self.with_db(|db| db.queue().discard(entry_id))?;
        tracing::warn!(entry = entry_id, operation = %entry.operation, target = %entry.target_id, "entry discarded");
        Ok(entry)
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
