// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Sync processor: drains the mutation queue against the remote API.
//!
//! The processor is the only component that talks to the server and the
//! only one that moves entries out of `pending`.
//!
//! # Drain pass
//!
//! ```text
//! offline? ──► skip
//! promote due retries (failed → pending)
//! for each lineage (entries sharing entity type + target id):
//!     for each entry, in order:
//!         pending → in_flight → remote call
//!         ok   → completed, fold server result into the record
//!         err  → failed (retry later, or terminal); stop this lineage
//! purge completed entries past retention
//! ```
//!
//! One drain runs at a time. A trigger that arrives mid-drain makes the
//! running drain loop once more instead of starting a second one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use clinicsync_core::{EntryStatus, FailureKind, Operation, QueueEntry, SyncStatus};

use super::connectivity::{ConnectivityMonitor, Transition};
use super::remote::{RemoteApi, RemoteError, RemoteRecord};
use super::session::SyncSession;
use crate::config::SyncPolicy;

/// Error type for sync operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Worth retrying: network trouble, 5xx, 408, 429.
    #[error("transient sync failure: {0}")]
    Transient(String),

    /// Retrying cannot help: validation, conflict, other 4xx.
    #[error("permanent sync failure: {message}")]
    Permanent {
        status: Option<u16>,
        message: String,
    },

    /// A drain was already running.
    #[error("a drain is already running")]
    Reentrant,

    /// Local storage failed.
    #[error(transparent)]
    Core(#[from] clinicsync_core::Error),
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        if err.is_retryable() {
            SyncError::Transient(err.to_string())
        } else {
            SyncError::Permanent {
                status: err.status(),
                message: err.to_string(),
            }
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Counts from one drain, summed over its passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub attempted: usize,
    pub completed: usize,
    /// Failures scheduled for another attempt.
    pub retried: usize,
    /// Failures that turned terminal.
    pub failed: usize,
    /// Temporary ids replaced by server ids.
    pub remapped: usize,
    /// Failed entries whose backoff had elapsed.
    pub promoted: usize,
    pub purged: usize,
    /// The drain did nothing because the monitor reported offline.
    pub skipped_offline: bool,
    /// Connectivity dropped part-way through.
    pub interrupted: bool,
}

impl DrainReport {
    fn absorb(&mut self, pass: DrainReport) {
        self.attempted += pass.attempted;
        self.completed += pass.completed;
        self.retried += pass.retried;
        self.failed += pass.failed;
        self.remapped += pass.remapped;
        self.promoted += pass.promoted;
        self.purged += pass.purged;
        self.skipped_offline |= pass.skipped_offline;
        self.interrupted |= pass.interrupted;
    }
}

/// Result of asking for a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DrainOutcome {
    Completed(DrainReport),
    /// Folded into the drain already running.
    Coalesced,
}

/// What happened to one entry.
enum Step {
    Completed { remapped: bool },
    Retrying,
    Terminal,
    /// Not pending anymore (backing off, cancelled, taken by another drain).
    Skipped,
}

/// Re-entrancy guard with a "run again" flag.
#[derive(Default)]
struct DrainGate {
    running: AtomicBool,
    rerun: AtomicBool,
}

impl DrainGate {
    /// Takes the gate, or leaves a rerun request for whoever holds it.
    fn enter(&self) -> bool {
        self.rerun.store(true, Ordering::Release);
        let entered = self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if entered {
            self.rerun.store(false, Ordering::Release);
        }
        entered
    }

    fn take_rerun(&self) -> bool {
        self.rerun.swap(false, Ordering::AcqRel)
    }

    fn release(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// After release: re-take the gate if a request slipped in meanwhile.
    fn reenter_if_requested(&self) -> bool {
        self.rerun.load(Ordering::Acquire) && self.enter()
    }
}

/// Releases the gate even if the drain future bails out.
struct GateGuard<'a>(&'a DrainGate);

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

fn next_attempt_at(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Drains one tenant's queue.
pub struct SyncProcessor<R> {
    session: SyncSession,
    remote: R,
    monitor: ConnectivityMonitor,
    policy: SyncPolicy,
    gate: DrainGate,
    wake: Notify,
}

impl<R: RemoteApi> SyncProcessor<R> {
    pub fn new(
        session: SyncSession,
        remote: R,
        monitor: ConnectivityMonitor,
        policy: SyncPolicy,
    ) -> Self {
        SyncProcessor {
            session,
            remote,
            monitor,
            policy,
            gate: DrainGate::default(),
            wake: Notify::new(),
        }
    }

    pub fn session(&self) -> &SyncSession {
        &self.session
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    /// Start-up step for the process that owns this tenant's drain: entries
    /// a crashed drain left `in_flight` go back to `pending`.
    ///
    /// Call once, while holding the tenant lock, before the first drain.
    pub fn recover_interrupted(&self) -> SyncResult<usize> {
        Ok(self.session.recover_in_flight()?)
    }

    /// Drains now, or folds into the drain already running.
    pub async fn sync_now(&self) -> SyncResult<DrainOutcome> {
        match self.drain().await {
            Ok(report) => Ok(DrainOutcome::Completed(report)),
            Err(SyncError::Reentrant) => Ok(DrainOutcome::Coalesced),
            Err(e) => Err(e),
        }
    }

    /// Wakes the background loop for a drain.
    pub fn trigger(&self) {
        self.wake.notify_one();
    }

    /// Resets retryable failures to `pending` without waiting out backoff.
    ///
    /// Exhausted and rejected entries stay failed; bring those back one at a
    /// time with [`SyncSession::requeue`].
    pub fn retry_failed(&self) -> SyncResult<usize> {
        let reset = self
            .session
            .with_db(|db| db.queue().retry_failed(self.policy.max_attempts))?;
        if reset > 0 {
            tracing::info!(reset, "failed entries reset for retry");
        }
        Ok(reset)
    }

    async fn drain(&self) -> SyncResult<DrainReport> {
        if !self.gate.enter() {
            tracing::debug!("drain already running; coalesced");
            return Err(SyncError::Reentrant);
        }

        let mut total = DrainReport::default();
        loop {
            {
                let _guard = GateGuard(&self.gate);
                loop {
                    total.absorb(self.pass().await?);
                    if !self.gate.take_rerun() {
                        break;
                    }
                }
            }
            if !self.gate.reenter_if_requested() {
                break;
            }
        }

        if total.attempted > 0 || total.purged > 0 {
            tracing::info!(
                tenant = %self.session.tenant(),
                attempted = total.attempted,
                completed = total.completed,
                retried = total.retried,
                failed = total.failed,
                remapped = total.remapped,
                purged = total.purged,
                "drain finished"
            );
        }
        Ok(total)
    }

    async fn pass(&self) -> SyncResult<DrainReport> {
        let mut report = DrainReport::default();
        if !self.monitor.is_online() {
            report.skipped_offline = true;
            return Ok(report);
        }

        let max_attempts = self.policy.max_attempts;
        let lineages = self.session.with_db(|db| {
            report.promoted = db.queue().promote_due(max_attempts)?;
            db.queue().lineages()
        })?;

        'lineages: for lineage in lineages {
            for entry in lineage {
                if !self.monitor.is_online() {
                    report.interrupted = true;
                    break 'lineages;
                }
                match self.process(&entry.id).await? {
                    Step::Completed { remapped } => {
                        report.attempted += 1;
                        report.completed += 1;
                        report.remapped += usize::from(remapped);
                    }
                    Step::Retrying => {
                        report.attempted += 1;
                        report.retried += 1;
                        break;
                    }
                    Step::Terminal => {
                        report.attempted += 1;
                        report.failed += 1;
                        break;
                    }
                    Step::Skipped => break,
                }
            }
        }

        let retention = self.policy.retention();
        report.purged = self.session.with_db(|db| {
            let cutoff = chrono::Duration::from_std(retention)
                .ok()
                .and_then(|keep| db.now().checked_sub_signed(keep))
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            db.queue().purge_completed(cutoff)
        })?;
        Ok(report)
    }

    /// Sends one entry, if it is still the pending head of its lineage.
    async fn process(&self, entry_id: &str) -> SyncResult<Step> {
        // Re-read under the lock: an earlier create in this pass may have
        // remapped the target, or a façade call may have cancelled the entry.
        let entry = self.session.with_db(|db| {
            let queue = db.queue();
            match queue.get(entry_id)? {
                Some(entry) if entry.status == EntryStatus::Pending => {
                    match queue.mark_in_flight(entry_id) {
                        Ok(claimed) => Ok(Some(claimed)),
                        // Another connection claimed it first.
                        Err(clinicsync_core::Error::InvalidTransition { .. }) => Ok(None),
                        Err(e) => Err(e),
                    }
                }
                _ => Ok(None),
            }
        })?;
        let Some(entry) = entry else {
            return Ok(Step::Skipped);
        };
        tracing::debug!(
            entry = %entry.id,
            operation = %entry.operation,
            entity_type = %entry.entity_type,
            target = %entry.target_id,
            "sending"
        );

        match self.send(&entry).await {
            Ok(server) => self.complete(&entry, server),
            Err(err) => self.fail(&entry, err),
        }
    }

    async fn send(&self, entry: &QueueEntry) -> Result<Option<RemoteRecord>, RemoteError> {
        let tenant = self.session.tenant();
        let empty = json!({});
        let payload: &Value = entry.payload.as_ref().unwrap_or(&empty);
        match entry.operation {
            Operation::Create => self
                .remote
                .create(tenant, &entry.entity_type, &entry.id, payload)
                .await
                .map(Some),
            Operation::Update => {
                self.remote
                    .update(tenant, &entry.entity_type, &entry.target_id, payload)
                    .await
            }
            Operation::Delete => self
                .remote
                .delete(tenant, &entry.entity_type, &entry.target_id)
                .await
                .map(|()| None),
        }
    }

    fn complete(&self, entry: &QueueEntry, server: Option<RemoteRecord>) -> SyncResult<Step> {
        let entity_type = &entry.entity_type;
        let remapped = self.session.with_db(|db| {
            db.atomically(|records, queue| {
                let mut target = entry.target_id.as_str();
                let mut remapped = false;
                if let (Operation::Create, Some(server)) = (entry.operation, &server) {
                    if server.id != entry.target_id {
                        records.remap_id(entity_type, &entry.target_id, &server.id)?;
                        queue.remap_target(entity_type, &entry.target_id, &server.id)?;
                        records.rewrite_references(&entry.target_id, &server.id)?;
                        target = server.id.as_str();
                        remapped = true;
                    }
                }
                queue.mark_completed(&entry.id)?;

                // Later local edits stay pending until their own entries land.
                if entry.operation != Operation::Delete
                    && !queue.has_open_entries(entity_type, target)?
                {
                    match &server {
                        Some(server) => records.apply_remote(entity_type, target, &server.fields)?,
                        None => records.set_status(entity_type, target, SyncStatus::Synced)?,
                    };
                }
                Ok(remapped)
            })
        })?;

        if remapped {
            tracing::debug!(
                %entity_type,
                from = %entry.target_id,
                to = server.as_ref().map(|s| s.id.as_str()).unwrap_or_default(),
                "remapped temporary id"
            );
        }
        Ok(Step::Completed { remapped })
    }

    fn fail(&self, entry: &QueueEntry, err: RemoteError) -> SyncResult<Step> {
        let failures = entry.attempts.saturating_add(1);
        let err = SyncError::from(err);
        let retry = matches!(err, SyncError::Transient(_)) && failures < self.policy.max_attempts;
        let delay = self.policy.backoff(failures);
        let message = err.to_string();

        self.session.with_db(|db| {
            let kind = if retry {
                FailureKind::Retryable {
                    next_attempt_at: next_attempt_at(db.now(), delay),
                }
            } else {
                FailureKind::Terminal
            };
            db.atomically(|records, queue| {
                queue.mark_failed(&entry.id, &message, kind)?;
                if kind == FailureKind::Terminal && entry.operation != Operation::Delete {
                    records.set_status(&entry.entity_type, &entry.target_id, SyncStatus::Error)?;
                }
                Ok(())
            })
        })?;

        if retry {
            tracing::warn!(entry = %entry.id, failures, ?delay, error = %message, "sync failed; will retry");
            Ok(Step::Retrying)
        } else {
            tracing::warn!(entry = %entry.id, failures, error = %message, "sync failed permanently");
            Ok(Step::Terminal)
        }
    }

    /// Background loop: drains on reconnect, on every interval tick while
    /// online, and on [`trigger`](Self::trigger). Returns once `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut watcher = self.monitor.subscribe();
        let mut ticker = tokio::time::interval(self.policy.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                transition = watcher.next_transition() => match transition {
                    Some(Transition::WentOnline) => {}
                    Some(Transition::WentOffline) => continue,
                    None => break,
                },
                _ = ticker.tick() => {
                    if !self.monitor.is_online() {
                        continue;
                    }
                }
                _ = self.wake.notified() => {}
            }

            match self.sync_now().await {
                Ok(DrainOutcome::Completed(_)) | Ok(DrainOutcome::Coalesced) => {}
                Err(e) => tracing::error!(error = %e, "drain aborted"),
            }
        }
        tracing::debug!(tenant = %self.session.tenant(), "sync loop stopped");
    }
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;
