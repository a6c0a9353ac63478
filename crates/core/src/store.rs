// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant-partitioned local record store.
//!
//! A [`RecordStore`] is a view over the `records` table for one tenant.
//! Every statement binds that tenant, so a handle cannot read or write
//! another tenant's rows.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;

use crate::clock::{to_db_timestamp, ClockSource};
use crate::db::{parse_db, parse_json, parse_timestamp};
use crate::error::{Error, Result};
use crate::record::{
    merge_payload, require_object, rewrite_references, EntityType, Record, SyncMetadata,
    SyncStatus,
};
use crate::tenant::TenantKey;

const RECORD_COLUMNS: &str = "entity_type, id, payload, sync_status, last_modified";

/// Per-status record counts for status indicators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordCounts {
    pub pending: usize,
    pub synced: usize,
    pub error: usize,
}

/// Record store view bound to one tenant.
pub struct RecordStore<'a> {
    conn: &'a Connection,
    tenant: &'a TenantKey,
    clock: &'a dyn ClockSource,
}

fn row_to_record(row: &Row<'_>) -> std::result::Result<Record, rusqlite::Error> {
    let entity_type: String = row.get(0)?;
    let payload: String = row.get(2)?;
    let status: String = row.get(3)?;
    let modified: String = row.get(4)?;

    Ok(Record {
        entity_type: parse_db(&entity_type, "entity_type")?,
        id: row.get(1)?,
        payload: parse_json(&payload, "payload")?,
        sync: SyncMetadata {
            status: parse_db(&status, "sync_status")?,
            last_modified: parse_timestamp(&modified, "last_modified")?,
        },
    })
}

impl<'a> RecordStore<'a> {
    pub fn new(conn: &'a Connection, tenant: &'a TenantKey, clock: &'a dyn ClockSource) -> Self {
        RecordStore {
            conn,
            tenant,
            clock,
        }
    }

    /// Upserts by `(entity_type, id)` and stamps `last_modified`.
    ///
    /// The record's own `sync.status` is persisted; [`Record::pending`]
    /// defaults it to `pending`.
    pub fn save(&self, mut record: Record) -> Result<Record> {
        require_object(&record.payload, "record payload")?;
        record.sync.last_modified = self.clock.now();

        self.conn.execute(
            "INSERT INTO records (tenant, entity_type, id, payload, sync_status, last_modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (tenant, entity_type, id) DO UPDATE SET
                 payload = excluded.payload,
                 sync_status = excluded.sync_status,
                 last_modified = excluded.last_modified",
            params![
                self.tenant.as_str(),
                record.entity_type.as_str(),
                record.id,
                serde_json::to_string(&record.payload)?,
                record.sync.status.as_str(),
                to_db_timestamp(&record.sync.last_modified),
            ],
        )?;
        Ok(record)
    }

    /// Merges `patch` into an existing record and marks it pending.
    pub fn update(&self, entity_type: &EntityType, id: &str, patch: &Value) -> Result<Record> {
        let mut record = self
            .get_by_id(entity_type, id)?
            .ok_or_else(|| Error::not_found(entity_type.as_str(), id))?;
        merge_payload(&mut record.payload, patch)?;
        record.sync.status = SyncStatus::Pending;
        self.save(record)
    }

    /// Deletes a record. Returns whether one existed.
    pub fn remove(&self, entity_type: &EntityType, id: &str) -> Result<bool> {
        let affected = self.conn.execute(
            "DELETE FROM records WHERE tenant = ?1 AND entity_type = ?2 AND id = ?3",
            params![self.tenant.as_str(), entity_type.as_str(), id],
        )?;
        Ok(affected > 0)
    }

    pub fn get_by_id(&self, entity_type: &EntityType, id: &str) -> Result<Option<Record>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records
             WHERE tenant = ?1 AND entity_type = ?2 AND id = ?3"
        );
        let record = self
            .conn
            .query_row(
                &sql,
                params![self.tenant.as_str(), entity_type.as_str(), id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// All records of one type, in insertion order.
    pub fn list(&self, entity_type: &EntityType) -> Result<Vec<Record>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records
             WHERE tenant = ?1 AND entity_type = ?2
             ORDER BY rowid"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(
                params![self.tenant.as_str(), entity_type.as_str()],
                row_to_record,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Sets the sync status without touching the payload.
    pub fn set_status(&self, entity_type: &EntityType, id: &str, status: SyncStatus) -> Result<bool> {
        let affected = self.conn.execute(
            "UPDATE records SET sync_status = ?1
             WHERE tenant = ?2 AND entity_type = ?3 AND id = ?4",
            params![status.as_str(), self.tenant.as_str(), entity_type.as_str(), id],
        )?;
        Ok(affected > 0)
    }

    /// Folds a server-returned resource into the local record and marks it synced.
    ///
    /// Server fields overwrite local ones; `id` is never copied into the payload.
    pub fn apply_remote(&self, entity_type: &EntityType, id: &str, fields: &Value) -> Result<bool> {
        let Some(mut record) = self.get_by_id(entity_type, id)? else {
            return Ok(false);
        };
        if let Some(fields) = fields.as_object() {
            let mut fields = fields.clone();
            fields.remove("id");
            merge_payload(&mut record.payload, &Value::Object(fields))?;
        }
        record.sync.status = SyncStatus::Synced;
        self.save(record)?;
        Ok(true)
    }

    /// Moves a record from `old_id` to `new_id`.
    ///
    /// Delete-old plus insert-new; a stale row already at `new_id` is
    /// replaced. Returns false if there was nothing at `old_id`.
    pub fn remap_id(&self, entity_type: &EntityType, old_id: &str, new_id: &str) -> Result<bool> {
        let Some(mut record) = self.get_by_id(entity_type, old_id)? else {
            return Ok(false);
        };
        self.remove(entity_type, old_id)?;
        record.id = new_id.to_string();
        self.save(record)?;
        Ok(true)
    }

    /// Rewrites JSON references to `old_id` inside every payload of the tenant.
    ///
    /// Returns the number of records changed.
    pub fn rewrite_references(&self, old_id: &str, new_id: &str) -> Result<usize> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_type, id, payload FROM records
             WHERE tenant = ?1 AND instr(payload, ?2) > 0",
        )?;
        let rows = stmt
            .query_map(params![self.tenant.as_str(), old_id], |row| {
                let payload: String = row.get(2)?;
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    parse_json(&payload, "payload")?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut changed = 0;
        for (entity_type, id, mut payload) in rows {
            if rewrite_references(&mut payload, old_id, new_id) {
                self.conn.execute(
                    "UPDATE records SET payload = ?1
                     WHERE tenant = ?2 AND entity_type = ?3 AND id = ?4",
                    params![
                        serde_json::to_string(&payload)?,
                        self.tenant.as_str(),
                        entity_type,
                        id
                    ],
                )?;
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Record counts by sync status across all entity types.
    pub fn counts(&self) -> Result<RecordCounts> {
        let mut stmt = self.conn.prepare(
            "SELECT sync_status, COUNT(*) FROM records WHERE tenant = ?1 GROUP BY sync_status",
        )?;
        let rows = stmt
            .query_map(params![self.tenant.as_str()], |row| {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((parse_db::<SyncStatus>(&status, "sync_status")?, count))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut counts = RecordCounts::default();
        for (status, count) in rows {
            let count = usize::try_from(count).unwrap_or(0);
            match status {
                SyncStatus::Pending => counts.pending = count,
                SyncStatus::Synced => counts.synced = count,
                SyncStatus::Error => counts.error = count,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
