// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for local storage operations.

use thiserror::Error;

/// All possible errors that can occur in clinicsync-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("record not found: {entity_type}/{id}")]
    NotFound { entity_type: String, id: String },

    #[error("queue entry not found: {0}")]
    EntryNotFound(String),

    #[error("invalid queue transition for {id}: cannot go from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    #[error("invalid entity type: '{0}'\n  hint: use 1-64 ASCII letters, digits, '_' or '-'")]
    InvalidEntityType(String),

    #[error("invalid tenant key: '{0}'")]
    InvalidTenantKey(String),

    #[error("tenant unavailable for '{identifier}': {reason}\n  hint: synchronization is disabled until the tenant resolves")]
    TenantUnavailable { identifier: String, reason: String },

    #[error("{0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupted data: {0}")]
    CorruptedData(String),
}

impl Error {
    /// Returns true for failures of the underlying persistent store.
    ///
    /// These are surfaced to callers as-is; the engine never retries them.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Error::Storage(_) | Error::Unavailable(_) | Error::Io(_) | Error::CorruptedData(_)
        )
    }

    pub fn not_found(entity_type: &str, id: &str) -> Self {
        Error::NotFound {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        }
    }
}

/// A specialized Result type for clinicsync-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
