// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Remote API abstraction.
//!
//! Provides a trait-based seam between the sync processor and the server:
//! - [`HttpRemote`](super::HttpRemote) for production
//! - an in-memory mock for processor tests

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use clinicsync_core::{EntityType, TenantKey};

/// Error type for remote operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The request never produced a response (refused, reset, timed out).
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The server answered 2xx with a body we cannot use.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The configured endpoint cannot be used as a base URL.
    #[error("invalid remote url '{0}'")]
    InvalidUrl(String),
}

impl RemoteError {
    /// Transient failures are retried with backoff; everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Network(_) => true,
            RemoteError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            RemoteError::InvalidResponse(_) | RemoteError::InvalidUrl(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Boxed future returned by [`RemoteApi`] methods.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = RemoteResult<T>> + Send + 'a>>;

/// A resource as returned by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    /// Server-assigned id, stringified if the server sent a number.
    pub id: String,
    /// Every field of the resource, `id` included.
    pub fields: Value,
}

impl RemoteRecord {
    /// Parses a JSON resource, requiring an object with a string or numeric `id`.
    pub fn from_value(value: Value) -> RemoteResult<Self> {
        let id = match value.get("id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(RemoteError::InvalidResponse(format!(
                    "unusable resource id: {other}"
                )))
            }
            None => {
                return Err(RemoteError::InvalidResponse(
                    "resource has no id".to_string(),
                ))
            }
        };
        if !value.is_object() {
            return Err(RemoteError::InvalidResponse(
                "resource is not a JSON object".to_string(),
            ));
        }
        Ok(RemoteRecord { id, fields: value })
    }
}

/// The server side of synchronization.
///
/// Implementations are shared between the processor and its background
/// task, hence `&self` and `Send + Sync`.
pub trait RemoteApi: Send + Sync {
    /// Creates a resource. `idempotency_key` is stable across retries of
    /// the same queue entry.
    fn create<'a>(
        &'a self,
        tenant: &'a TenantKey,
        entity_type: &'a EntityType,
        idempotency_key: &'a str,
        payload: &'a Value,
    ) -> RemoteFuture<'a, RemoteRecord>;

    /// Applies a partial update. `None` when the server returns no body.
    fn update<'a>(
        &'a self,
        tenant: &'a TenantKey,
        entity_type: &'a EntityType,
        id: &'a str,
        patch: &'a Value,
    ) -> RemoteFuture<'a, Option<RemoteRecord>>;

    /// Deletes a resource. Deleting something already gone succeeds.
    fn delete<'a>(
        &'a self,
        tenant: &'a TenantKey,
        entity_type: &'a EntityType,
        id: &'a str,
    ) -> RemoteFuture<'a, ()>;
}

#[cfg(test)]
#[path = "remote_tests.rs"]
mod tests;
