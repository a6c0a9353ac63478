// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

use crate::sync::{RemoteError, SyncError};

/// All possible errors surfaced by the clinicsync engine and CLI.
///
/// Errors provide user-friendly messages with hints for common issues.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not initialized: run 'clinicsync init' first")]
    NotInitialized,

    #[error("no tenant selected\n  hint: pass --tenant <identifier>; configured: {}", configured.join(", "))]
    NoTenantSelected { configured: Vec<String> },

    #[error(transparent)]
    Core(#[from] clinicsync_core::Error),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("remote: {0}")]
    Remote(#[from] RemoteError),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}\n  hint: another clinicsync process is already draining this tenant")]
    Lock(String),
}

/// A specialized Result type for clinicsync operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
