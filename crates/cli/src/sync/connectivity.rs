// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Online/offline state shared across a process.
//!
//! The platform (or the CLI's health probe) calls
//! [`ConnectivityMonitor::set_online`]; the sync processor reads
//! [`is_online`](ConnectivityMonitor::is_online) and waits on edges through a
//! [`ConnectivityWatcher`].

use std::sync::Arc;

use tokio::sync::watch;

/// An edge of the connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    WentOnline,
    WentOffline,
}

impl Transition {
    fn to(online: bool) -> Self {
        if online {
            Transition::WentOnline
        } else {
            Transition::WentOffline
        }
    }
}

/// Process-wide connectivity flag. Clones share state.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        ConnectivityMonitor { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Records the current state. Returns the edge if the state changed.
    pub fn set_online(&self, online: bool) -> Option<Transition> {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if !changed {
            return None;
        }
        let transition = Transition::to(online);
        tracing::info!(?transition, "connectivity changed");
        Some(transition)
    }

    /// Watches for edges from now on.
    pub fn subscribe(&self) -> ConnectivityWatcher {
        let rx = self.tx.subscribe();
        let last = *rx.borrow();
        ConnectivityWatcher { rx, last }
    }
}

/// Receives connectivity edges.
///
/// Rapid flips between two polls may collapse; the watcher only reports a
/// transition when the observed state differs from the last one it reported.
#[derive(Debug)]
pub struct ConnectivityWatcher {
    rx: watch::Receiver<bool>,
    last: bool,
}

impl ConnectivityWatcher {
    /// Waits for the next edge. `None` once every monitor is gone.
    pub async fn next_transition(&mut self) -> Option<Transition> {
        loop {
            if self.rx.changed().await.is_err() {
                return None;
            }
            let online = *self.rx.borrow_and_update();
            if online != self.last {
                self.last = online;
                return Some(Transition::to(online));
            }
        }
    }
}

#[cfg(test)]
#[path = "connectivity_tests.rs"]
mod tests;
