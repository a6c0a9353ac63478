// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Offline-first synchronization.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐   atomic write    ┌──────────────────────────┐
//! │   Façades   │──────────────────►│ TenantDb (records+queue) │
//! │ (Collection)│                   └──────────────────────────┘
//! └─────────────┘                                ▲
//!                                                │ drain
//! ┌──────────────┐  transitions   ┌──────────────┴──┐     ┌────────────┐
//! │ Connectivity │───────────────►│  SyncProcessor  │────►│ RemoteApi  │
//! │   Monitor    │                └─────────────────┘     │  (trait)   │
//! └──────────────┘                                        └────────────┘
//! ```
//!
//! # Features
//!
//! - Optimistic local writes that never wait on the network
//! - Per-entity FIFO delivery with temporary id remapping
//! - Idempotent creates and exponential retry backoff
//! - Tenant-scoped sessions; no process-wide state
//! - Injectable remote trait for testing

mod connectivity;
mod entities;
mod facade;
mod http;
mod processor;
mod remote;
mod session;

pub use connectivity::{ConnectivityMonitor, ConnectivityWatcher, Transition};
pub use entities::{BoardingStay, Kennel, SoapTemplate};
pub use facade::{Collection, DeleteOutcome, Entity, Stored, TypedCollection};
pub use http::{HealthProbe, HttpRemote};
pub use processor::{DrainOutcome, DrainReport, SyncError, SyncProcessor, SyncResult};
pub use remote::{RemoteApi, RemoteError, RemoteFuture, RemoteRecord, RemoteResult};
pub use session::{Counters, StatusSnapshot, SyncSession};

#[cfg(test)]
mod test_helpers;
