// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Commands that drive the sync processor against the configured server.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{print_json, Context};
use crate::config::{lock_path, Config};
use crate::error::{Error, Result};
use crate::sync::{
    ConnectivityMonitor, Counters, DrainOutcome, HealthProbe, HttpRemote, SyncProcessor,
    SyncSession,
};

#[derive(Debug, Serialize)]
struct SyncReport {
    online: bool,
    #[serde(flatten)]
    outcome: DrainOutcome,
    counters: Counters,
}

fn build_processor(
    session: SyncSession,
    config: &Config,
    online: bool,
) -> Result<SyncProcessor<HttpRemote>> {
    let remote = HttpRemote::new(
        &config.remote.url,
        config.remote.token.clone(),
        config.remote.timeout(),
    )?;
    Ok(SyncProcessor::new(
        session,
        remote,
        ConnectivityMonitor::new(online),
        config.sync.clone(),
    ))
}

/// One drain. Without `--offline` the server's health endpoint decides
/// whether we are online.
pub async fn sync(ctx: &Context, offline: bool) -> Result<()> {
    let (session, config) = ctx.open_session()?;
    let _lock = acquire_lock(&lock_path(&ctx.data_dir, session.tenant()))?;
    let online = if offline {
        false
    } else {
        HealthProbe::new(&config.remote.url, config.remote.timeout())?
            .check()
            .await
    };
    if !online {
        tracing::info!(remote = %config.remote.url, "offline; nothing sent");
    }

    let processor = build_processor(session.clone(), &config, online)?;
    processor.recover_interrupted()?;
    let outcome = processor.sync_now().await?;
    print_json(&SyncReport {
        online,
        outcome,
        counters: session.counters()?,
    })
}

#[derive(Debug, Serialize)]
struct RetryReport {
    reset: usize,
}

/// Takes the tenant lock so a reset never races a running drain.
pub fn retry(ctx: &Context) -> Result<()> {
    let (session, config) = ctx.open_session()?;
    let _lock = acquire_lock(&lock_path(&ctx.data_dir, session.tenant()))?;
    let reset = build_processor(session, &config, false)?.retry_failed()?;
    print_json(&RetryReport { reset })
}

/// Exclusive advisory lock on the tenant's lock file. Every command that
/// drains or resets the queue holds it for its whole run.
fn acquire_lock(path: &Path) -> Result<File> {
    use fs2::FileExt;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    file.try_lock_exclusive()
        .map_err(|_| Error::Lock(format!("{} is locked", path.display())))?;
    Ok(file)
}

/// Drains until Ctrl-C: on reconnect, on every interval tick, and whenever
/// the health probe flips connectivity.
pub async fn watch(ctx: &Context) -> Result<()> {
    let (session, config) = ctx.open_session()?;
    let _lock = acquire_lock(&lock_path(&ctx.data_dir, session.tenant()))?;

    let probe = HealthProbe::new(&config.remote.url, config.remote.timeout())?;
    let online = probe.check().await;
    let processor = Arc::new(build_processor(session.clone(), &config, online)?);
    processor.recover_interrupted()?;
    let monitor = processor.monitor().clone();
    let cancel = CancellationToken::new();
    tracing::info!(
        tenant = %session.tenant(),
        remote = %config.remote.url,
        online,
        "watch started"
    );

    let drain_task = tokio::spawn(Arc::clone(&processor).run(cancel.clone()));
    let probe_task = tokio::spawn({
        let cancel = cancel.clone();
        let mut ticker = tokio::time::interval(config.sync.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        monitor.set_online(probe.check().await);
                    }
                }
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupted; stopping");
    cancel.cancel();
    for task in [drain_task, probe_task] {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "watch task failed");
        }
    }

    print_json(&session.refresh()?)
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
