// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Durable mutation queue.
//!
//! Every optimistic local write appends one entry here. Entries are rows in
//! the `queue` table, committed before [`MutationQueue::add_operation`]
//! returns, so a crash never loses an acknowledged write.
//!
//! Per-entry state machine:
//!
//! ```text
//! pending ──► in_flight ──► completed
//!    ▲            │
//!    │            ▼
//!    └─────── failed (retryable, backoff-gated)
//!                 │
//!                 ▼
//!           failed (terminal: manual requeue or discard only)
//! ```
//!
//! Entries sharing `(entity_type, target_id)` form a *lineage* and are
//! always read back in `(created_at, seq)` order.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::clock::{to_db_timestamp, ClockSource};
use crate::db::{parse_db, parse_json, parse_timestamp};
use crate::error::{Error, Result};
use crate::id::generate_entry_id;
use crate::record::{rewrite_references, EntityType, Operation};
use crate::tenant::TenantKey;

const ENTRY_COLUMNS: &str = "seq, id, entity_type, target_id, operation, payload, status, \
     attempts, terminal, last_error, next_attempt_at, created_at, updated_at";

/// Lifecycle state of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    InFlight,
    Completed,
    Failed,
}

impl EntryStatus {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::InFlight => "in_flight",
            EntryStatus::Completed => "completed",
            EntryStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(EntryStatus::Pending),
            "in_flight" => Ok(EntryStatus::InFlight),
            "completed" => Ok(EntryStatus::Completed),
            "failed" => Ok(EntryStatus::Failed),
            _ => Err(Error::InvalidInput(format!("invalid entry status: '{s}'"))),
        }
    }
}

/// How a failed entry may continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Eligible for automatic retry once `next_attempt_at` has passed.
    Retryable { next_attempt_at: DateTime<Utc> },
    /// Never retried automatically.
    Terminal,
}

/// One queued mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueEntry {
    /// Append order; breaks `created_at` ties.
    pub seq: i64,
    pub id: String,
    pub entity_type: EntityType,
    /// Record id being mutated. May be a temporary id.
    pub target_id: String,
    pub operation: Operation,
    /// Full object for create, partial diff for update, none for delete.
    pub payload: Option<Value>,
    pub status: EntryStatus,
    /// Number of failed attempts so far.
    pub attempts: u32,
    pub terminal: bool,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueEntry {
    /// True if the entry never left `pending`.
    pub fn is_untouched(&self) -> bool {
        self.status == EntryStatus::Pending && self.attempts == 0
    }
}

/// Entry counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub failed: usize,
}

fn row_to_entry(row: &Row<'_>) -> std::result::Result<QueueEntry, rusqlite::Error> {
    let entity_type: String = row.get(2)?;
    let operation: String = row.get(4)?;
    let payload: Option<String> = row.get(5)?;
    let status: String = row.get(6)?;
    let attempts: i64 = row.get(7)?;
    let next_attempt_at: Option<String> = row.get(10)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;

    Ok(QueueEntry {
        seq: row.get(0)?,
        id: row.get(1)?,
        entity_type: parse_db(&entity_type, "entity_type")?,
        target_id: row.get(3)?,
        operation: parse_db(&operation, "operation")?,
        payload: payload
            .map(|p| parse_json(&p, "payload"))
            .transpose()?,
        status: parse_db(&status, "status")?,
        attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
        terminal: row.get(8)?,
        last_error: row.get(9)?,
        next_attempt_at: next_attempt_at
            .map(|t| parse_timestamp(&t, "next_attempt_at"))
            .transpose()?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

/// Mutation queue view bound to one tenant.
pub struct MutationQueue<'a> {
    conn: &'a Connection,
    tenant: &'a TenantKey,
    clock: &'a dyn ClockSource,
}

impl<'a> MutationQueue<'a> {
    pub fn new(conn: &'a Connection, tenant: &'a TenantKey, clock: &'a dyn ClockSource) -> Self {
        MutationQueue {
            conn,
            tenant,
            clock,
        }
    }

    fn now(&self) -> String {
        to_db_timestamp(&self.clock.now())
    }

    fn select(&self, filter: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<QueueEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM queue WHERE tenant = ?1 AND ({filter})
             ORDER BY created_at, seq"
        );
        let mut bound: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(args.len() + 1);
        let tenant = self.tenant.as_str();
        bound.push(&tenant);
        bound.extend_from_slice(args);

        let mut stmt = self.conn.prepare(&sql)?;
        let entries = stmt
            .query_map(bound.as_slice(), row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn require(&self, id: &str) -> Result<QueueEntry> {
        self.get(id)?
            .ok_or_else(|| Error::EntryNotFound(id.to_string()))
    }

    fn invalid(entry: &QueueEntry, to: &str) -> Error {
        Error::InvalidTransition {
            id: entry.id.clone(),
            from: entry.status.to_string(),
            to: to.to_string(),
        }
    }

    /// Appends a `pending` entry and returns its id.
    pub fn add_operation(
        &self,
        entity_type: &EntityType,
        target_id: &str,
        operation: Operation,
        payload: Option<&Value>,
    ) -> Result<String> {
        let id = generate_entry_id();
        let now = self.now();
        let payload = payload.map(serde_json::to_string).transpose()?;

        self.conn.execute(
            "INSERT INTO queue (id, tenant, entity_type, target_id, operation, payload,
                                status, attempts, terminal, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', 0, 0, ?7, ?7)",
            params![
                id,
                self.tenant.as_str(),
                entity_type.as_str(),
                target_id,
                operation.as_str(),
                payload,
                now,
            ],
        )?;
        tracing::debug!(entry = %id, %entity_type, target = target_id, %operation, "queued");
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Result<Option<QueueEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM queue WHERE tenant = ?1 AND id = ?2");
        let entry = self
            .conn
            .query_row(&sql, params![self.tenant.as_str(), id], row_to_entry)
            .optional()?;
        Ok(entry)
    }

    /// `pending` entries in FIFO order.
    pub fn list_pending(&self) -> Result<Vec<QueueEntry>> {
        self.select("status = 'pending'", &[])
    }

    /// `failed` entries in FIFO order, retryable and terminal alike.
    pub fn list_failed(&self) -> Result<Vec<QueueEntry>> {
        self.select("status = 'failed'", &[])
    }

    /// Every entry that is not completed, in FIFO order.
    pub fn list_open(&self) -> Result<Vec<QueueEntry>> {
        self.select("status != 'completed'", &[])
    }

    /// Open entries of one lineage, in FIFO order.
    pub fn lineage(&self, entity_type: &EntityType, target_id: &str) -> Result<Vec<QueueEntry>> {
        let entity_type = entity_type.as_str();
        self.select(
            "status != 'completed' AND entity_type = ?2 AND target_id = ?3",
            &[&entity_type, &target_id],
        )
    }

    /// Open entries grouped by lineage.
    ///
    /// Each group is in FIFO order; groups are ordered by their first entry.
    pub fn lineages(&self) -> Result<Vec<Vec<QueueEntry>>> {
        let mut groups: Vec<Vec<QueueEntry>> = Vec::new();
        let mut index: HashMap<(String, String), usize> = HashMap::new();
        for entry in self.list_open()? {
            let key = (entry.entity_type.to_string(), entry.target_id.clone());
            match index.get(&key) {
                Some(&i) => groups[i].push(entry),
                None => {
                    index.insert(key, groups.len());
                    groups.push(vec![entry]);
                }
            }
        }
        Ok(groups)
    }

    /// True if the lineage still has entries that are not completed.
    pub fn has_open_entries(&self, entity_type: &EntityType, target_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM queue
             WHERE tenant = ?1 AND entity_type = ?2 AND target_id = ?3 AND status != 'completed'",
            params![self.tenant.as_str(), entity_type.as_str(), target_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// `pending → in_flight`.
    ///
    /// The claim is a single conditional update, so of two connections
    /// racing for the same entry exactly one wins.
    pub fn mark_in_flight(&self, id: &str) -> Result<QueueEntry> {
        let claimed = self.conn.execute(
            "UPDATE queue SET status = 'in_flight', updated_at = ?1
             WHERE tenant = ?2 AND id = ?3 AND status = 'pending'",
            params![self.now(), self.tenant.as_str(), id],
        )?;
        let entry = self.require(id)?;
        if claimed == 0 {
            return Err(Self::invalid(&entry, "in_flight"));
        }
        Ok(entry)
    }

    /// `in_flight → completed`.
    pub fn mark_completed(&self, id: &str) -> Result<()> {
        let entry = self.require(id)?;
        if entry.status != EntryStatus::InFlight {
            return Err(Self::invalid(&entry, "completed"));
        }
        self.conn.execute(
            "UPDATE queue SET status = 'completed', last_error = NULL, next_attempt_at = NULL,
                              updated_at = ?1
             WHERE tenant = ?2 AND id = ?3",
            params![self.now(), self.tenant.as_str(), id],
        )?;
        Ok(())
    }

    /// `in_flight → failed`, counting the attempt.
    pub fn mark_failed(&self, id: &str, error: &str, kind: FailureKind) -> Result<QueueEntry> {
        let entry = self.require(id)?;
        if entry.status != EntryStatus::InFlight {
            return Err(Self::invalid(&entry, "failed"));
        }
        let (terminal, next_attempt_at) = match kind {
            FailureKind::Retryable { next_attempt_at } => {
                (false, Some(to_db_timestamp(&next_attempt_at)))
            }
            FailureKind::Terminal => (true, None),
        };
        self.conn.execute(
            "UPDATE queue SET status = 'failed', attempts = attempts + 1, terminal = ?1,
                              last_error = ?2, next_attempt_at = ?3, updated_at = ?4
             WHERE tenant = ?5 AND id = ?6",
            params![
                terminal,
                error,
                next_attempt_at,
                self.now(),
                self.tenant.as_str(),
                id
            ],
        )?;
        self.require(id)
    }

    /// Moves retryable failures whose backoff has elapsed back to `pending`.
    pub fn promote_due(&self, max_attempts: u32) -> Result<usize> {
        let now = self.now();
        let affected = self.conn.execute(
            "UPDATE queue SET status = 'pending', next_attempt_at = NULL, updated_at = ?1
             WHERE tenant = ?2 AND status = 'failed' AND terminal = 0 AND attempts < ?3
               AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)",
            params![now, self.tenant.as_str(), max_attempts],
        )?;
        Ok(affected)
    }

    /// Resets non-terminal failures below `max_attempts` to `pending`,
    /// ignoring any remaining backoff.
    ///
    /// Terminal and exhausted entries are left alone; those go back only
    /// through [`requeue`](Self::requeue), which also resets the attempt
    /// budget.
    pub fn retry_failed(&self, max_attempts: u32) -> Result<usize> {
        let affected = self.conn.execute(
            "UPDATE queue SET status = 'pending', next_attempt_at = NULL, updated_at = ?1
             WHERE tenant = ?2 AND status = 'failed' AND terminal = 0 AND attempts < ?3",
            params![self.now(), self.tenant.as_str(), max_attempts],
        )?;
        Ok(affected)
    }

    /// Manual intervention: put any failed entry back to `pending` with a
    /// fresh attempt budget.
    pub fn requeue(&self, id: &str) -> Result<QueueEntry> {
        let entry = self.require(id)?;
        if entry.status != EntryStatus::Failed {
            return Err(Self::invalid(&entry, "pending"));
        }
        self.conn.execute(
            "UPDATE queue SET status = 'pending', attempts = 0, terminal = 0,
                              next_attempt_at = NULL, updated_at = ?1
             WHERE tenant = ?2 AND id = ?3",
            params![self.now(), self.tenant.as_str(), id],
        )?;
        self.require(id)
    }

    /// Drops a failed entry the user has given up on.
    ///
    /// Discarding a `create` drops the rest of its lineage too: the later
    /// entries target an id the server will never assign.
    pub fn discard(&self, id: &str) -> Result<QueueEntry> {
        let entry = self.require(id)?;
        if entry.status != EntryStatus::Failed {
            return Err(Self::invalid(&entry, "discarded"));
        }
        if entry.operation == Operation::Create {
            self.conn.execute(
                "DELETE FROM queue
                 WHERE tenant = ?1 AND entity_type = ?2 AND target_id = ?3
                   AND status IN ('pending', 'failed')",
                params![
                    self.tenant.as_str(),
                    entry.entity_type.as_str(),
                    entry.target_id
                ],
            )?;
        } else {
            self.conn.execute(
                "DELETE FROM queue WHERE tenant = ?1 AND id = ?2",
                params![self.tenant.as_str(), id],
            )?;
        }
        Ok(entry)
    }

    /// Returns entries stranded `in_flight` by a crash to `pending`.
    ///
    /// The interrupted attempt is counted: the request may have reached the
    /// server.
    pub fn recover_in_flight(&self) -> Result<usize> {
        let affected = self.conn.execute(
            "UPDATE queue SET status = 'pending', attempts = attempts + 1, updated_at = ?1
             WHERE tenant = ?2 AND status = 'in_flight'",
            params![self.now(), self.tenant.as_str()],
        )?;
        Ok(affected)
    }

    /// Rewrites references to a temporary id after its create completed.
    ///
    /// Open entries targeting `old_id` are retargeted to `new_id`, and JSON
    /// strings equal to `old_id` inside open payloads (of any entity type)
    /// are replaced. Returns the number of entries changed.
    pub fn remap_target(&self, entity_type: &EntityType, old_id: &str, new_id: &str) -> Result<usize> {
        let retargeted = self.conn.execute(
            "UPDATE queue SET target_id = ?1
             WHERE tenant = ?2 AND entity_type = ?3 AND target_id = ?4 AND status != 'completed'",
            params![new_id, self.tenant.as_str(), entity_type.as_str(), old_id],
        )?;

        let mut patched = 0;
        for mut entry in self.select(
            "status != 'completed' AND payload IS NOT NULL AND instr(payload, ?2) > 0",
            &[&old_id],
        )? {
            let Some(payload) = entry.payload.as_mut() else {
                continue;
            };
            if rewrite_references(payload, old_id, new_id) {
                self.conn.execute(
                    "UPDATE queue SET payload = ?1 WHERE tenant = ?2 AND id = ?3",
                    params![
                        serde_json::to_string(payload)?,
                        self.tenant.as_str(),
                        entry.id
                    ],
                )?;
                patched += 1;
            }
        }
        Ok(retargeted + patched)
    }

    /// Deletes the pending entries of a lineage. Returns how many went.
    pub fn cancel_lineage(&self, entity_type: &EntityType, target_id: &str) -> Result<usize> {
        let affected = self.conn.execute(
            "DELETE FROM queue
             WHERE tenant = ?1 AND entity_type = ?2 AND target_id = ?3 AND status = 'pending'",
            params![self.tenant.as_str(), entity_type.as_str(), target_id],
        )?;
        Ok(affected)
    }

    /// Deletes completed entries last touched before `older_than`.
    pub fn purge_completed(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let affected = self.conn.execute(
            "DELETE FROM queue WHERE tenant = ?1 AND status = 'completed' AND updated_at < ?2",
            params![self.tenant.as_str(), to_db_timestamp(&older_than)],
        )?;
        Ok(affected)
    }

    pub fn stats(&self) -> Result<QueueStats> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM queue WHERE tenant = ?1 GROUP BY status")?;
        let rows = stmt
            .query_map(params![self.tenant.as_str()], |row| {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((parse_db::<EntryStatus>(&status, "status")?, count))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            let count = usize::try_from(count).unwrap_or(0);
            match status {
                EntryStatus::Pending => stats.pending = count,
                EntryStatus::InFlight => stats.in_flight = count,
                EntryStatus::Completed => stats.completed = count,
                EntryStatus::Failed => stats.failed = count,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
