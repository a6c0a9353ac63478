// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! clinicsync-core: local storage for the offline-first sync engine.
//!
//! This crate owns everything that lives on the client's disk: the
//! tenant-partitioned record store, the durable mutation queue, and the
//! small value types both of them share. It is synchronous; the async
//! engine in the `clinicsync` crate drives it.

pub mod clock;
pub mod db;
pub mod error;
pub mod id;
pub mod queue;
pub mod record;
pub mod store;
pub mod tenant;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use db::{Database, TenantDb};
pub use error::{Error, Result};
pub use queue::{EntryStatus, FailureKind, MutationQueue, QueueEntry, QueueStats};
pub use record::{EntityType, Operation, Record, SyncMetadata, SyncStatus};
pub use store::{RecordCounts, RecordStore};
pub use tenant::{Resolution, StaticResolver, TenantKey, TenantResolver, TenantStatus};
