// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant namespaces.
//!
//! Every row the engine persists is keyed by a [`TenantKey`]. The key comes
//! from a [`TenantResolver`] once per session and is then baked into the
//! storage handles, so no call site ever passes a tenant explicitly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};

const MAX_TENANT_KEY_LEN: usize = 128;

/// Stable partition key for one tenant's local data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantKey(String);

impl TenantKey {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let valid = !key.is_empty()
            && key.len() <= MAX_TENANT_KEY_LEN
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if valid {
            Ok(TenantKey(key))
        } else {
            Err(Error::InvalidTenantKey(key))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TenantKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        TenantKey::new(value)
    }
}

impl From<TenantKey> for String {
    fn from(value: TenantKey) -> Self {
        value.0
    }
}

/// Account state reported by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Suspended,
    Unknown,
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
            TenantStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Result of resolving an identifier (subdomain, login hint) to a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub tenant_key: Option<TenantKey>,
    pub status: TenantStatus,
}

impl Resolution {
    pub fn active(key: TenantKey) -> Self {
        Resolution {
            tenant_key: Some(key),
            status: TenantStatus::Active,
        }
    }

    pub fn unknown() -> Self {
        Resolution {
            tenant_key: None,
            status: TenantStatus::Unknown,
        }
    }

    /// Returns the key only for an active tenant with a key.
    ///
    /// Anything else means no synchronization is available for `identifier`.
    pub fn into_active_key(self, identifier: &str) -> Result<TenantKey> {
        match (self.tenant_key, self.status) {
            (Some(key), TenantStatus::Active) => Ok(key),
            (None, status) => Err(Error::TenantUnavailable {
                identifier: identifier.to_string(),
                reason: format!("no tenant key (status {status})"),
            }),
            (Some(_), status) => Err(Error::TenantUnavailable {
                identifier: identifier.to_string(),
                reason: format!("tenant is {status}"),
            }),
        }
    }
}

/// Maps an identifier to a tenant namespace.
pub trait TenantResolver {
    fn resolve(&self, identifier: &str) -> Result<Resolution>;
}

/// Resolver backed by a fixed table, e.g. the `[tenants]` config section.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<String, Resolution>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identifier: impl Into<String>, resolution: Resolution) {
        self.entries.insert(identifier.into(), resolution);
    }

    pub fn with(mut self, identifier: impl Into<String>, resolution: Resolution) -> Self {
        self.insert(identifier, resolution);
        self
    }
}

impl TenantResolver for StaticResolver {
    fn resolve(&self, identifier: &str) -> Result<Resolution> {
        Ok(self
            .entries
            .get(identifier)
            .cloned()
            .unwrap_or_else(Resolution::unknown))
    }
}

#[cfg(test)]
#[path = "tenant_tests.rs"]
mod tests;
