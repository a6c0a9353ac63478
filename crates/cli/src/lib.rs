// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! clinicsync - offline-first synchronization for multi-tenant practice data.
//!
//! Local writes land in SQLite immediately and are replayed against the
//! server by a background processor once connectivity allows.
//!
//! # Main Components
//!
//! - [`SyncSession`](sync::SyncSession) - one tenant's storage, façades and counters
//! - [`Collection`](sync::Collection) / [`TypedCollection`](sync::TypedCollection) - entity façades
//! - [`SyncProcessor`](sync::SyncProcessor) - drains the mutation queue through a [`RemoteApi`](sync::RemoteApi)
//! - [`ConnectivityMonitor`](sync::ConnectivityMonitor) - online/offline state and transitions
//! - [`Config`] - remote endpoint, retry policy and tenant table
//!
//! # Usage
//!
//! ```rust,ignore
//! use clinicsync::sync::{ConnectivityMonitor, HttpRemote, Kennel, SyncProcessor, SyncSession};
//!
//! let session = SyncSession::open(&resolver, "acme", &db_path, Arc::new(SystemClock))?;
//! let kennels = session.typed::<Kennel>()?;
//! kennels.create(&Kennel { name: "Run A".into(), capacity: Some(2), notes: None })?;
//!
//! let processor = SyncProcessor::new(session, remote, ConnectivityMonitor::new(true), policy);
//! processor.sync_now().await?;
//! ```

mod cli;
mod commands;

pub mod config;
pub mod error;
pub mod sync;

pub use cli::{Cli, Command};
pub use config::Config;
pub use error::{Error, Result};

use commands::Context;

/// Resolves the data directory and dispatches to the command.
pub async fn run(cli: Cli) -> Result<()> {
    let ctx = Context {
        data_dir: config::resolve_data_dir(cli.dir.as_deref())?,
        tenant: cli.tenant,
    };

    match cli.command {
        Command::Init {
            remote,
            token,
            tenant_key,
        } => commands::init::run(&ctx, remote, token, tenant_key),
        Command::Create { entity, data } => commands::records::create(&ctx, &entity, &data),
        Command::Update { entity, id, patch } => {
            commands::records::update(&ctx, &entity, &id, &patch)
        }
        Command::Delete { entity, id } => commands::records::delete(&ctx, &entity, &id),
        Command::Get { entity, id } => commands::records::get(&ctx, &entity, &id),
        Command::List { entity } => commands::records::list(&ctx, &entity),
        Command::Status => commands::queue::status(&ctx),
        Command::Sync { offline } => commands::sync::sync(&ctx, offline).await,
        Command::Queue { failed } => commands::queue::show(&ctx, failed),
        Command::Retry => commands::sync::retry(&ctx),
        Command::Requeue { entry } => commands::queue::requeue(&ctx, &entry),
        Command::Discard { entry } => commands::queue::discard(&ctx, &entry),
        Command::Watch => commands::sync::watch(&ctx).await,
    }
}
