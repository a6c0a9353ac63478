// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Data directory and configuration management.
//!
//! Everything lives under one data directory:
//! - `config.toml`: remote endpoint, sync policy, tenant table
//! - `clinicsync.db`: records and mutation queue for every tenant
//! - `clinicsync.log`: `watch` log output
//! - `<tenant>.lock`: held while `watch` drains that tenant

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clinicsync_core::{Resolution, StaticResolver, TenantKey, TenantStatus};

use crate::error::{Error, Result};

const APP_DIR_NAME: &str = "clinicsync";
const CONFIG_FILE_NAME: &str = "config.toml";
const DB_FILE_NAME: &str = "clinicsync.db";
const LOG_FILE_NAME: &str = "clinicsync.log";

/// Configuration stored in `<data_dir>/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub sync: SyncPolicy,
    /// Identifier (subdomain, login hint) to tenant.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tenants: BTreeMap<String, TenantEntry>,
}

/// Remote API endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL; entity endpoints live under `{url}/api/`.
    #[serde(default = "default_remote_url")]
    pub url: String,
    /// Bearer token sent with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            url: default_remote_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

fn default_remote_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Retry and scheduling policy for the sync processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPolicy {
    /// Failed attempts before an entry turns terminal (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay after the first failure in milliseconds (default: 1000).
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Cap on the retry delay in seconds (default: 300).
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    /// Periodic drain interval while online, in seconds (default: 30).
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// How long completed entries are kept, in seconds (default: 86400).
    #[serde(default = "default_completed_retention_secs")]
    pub completed_retention_secs: u64,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        SyncPolicy {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_secs: default_max_backoff_secs(),
            interval_secs: default_interval_secs(),
            completed_retention_secs: default_completed_retention_secs(),
        }
    }
}

impl SyncPolicy {
    /// Delay before retrying an entry that has failed `attempts` times.
    ///
    /// `initial * 2^(attempts - 1)`, capped at `max_backoff_secs`.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(63);
        let delay_ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent);
        let cap_ms = self.max_backoff_secs.saturating_mul(1000);
        Duration::from_millis(delay_ms.min(cap_ms))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.completed_retention_secs)
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_secs() -> u64 {
    300
}

fn default_interval_secs() -> u64 {
    30
}

fn default_completed_retention_secs() -> u64 {
    86_400
}

/// One row of the `[tenants]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantEntry {
    pub key: String,
    #[serde(default = "default_tenant_status")]
    pub status: TenantStatus,
}

fn default_tenant_status() -> TenantStatus {
    TenantStatus::Active
}

impl Config {
    /// Loads configuration from the given data directory.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(Error::NotInitialized);
        }
        let content = fs::read_to_string(&config_path)
            .map_err(|e| Error::Config(format!("failed to read config: {}", e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Saves configuration to the given data directory.
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        fs::create_dir_all(data_dir)?;
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(data_dir.join(CONFIG_FILE_NAME), content)?;
        Ok(())
    }

    /// Builds a resolver from the `[tenants]` table. Fails on an invalid key.
    pub fn resolver(&self) -> Result<StaticResolver> {
        let mut resolver = StaticResolver::new();
        for (identifier, entry) in &self.tenants {
            let key = TenantKey::new(entry.key.clone()).map_err(|e| {
                Error::Config(format!("tenant '{}': {}", identifier, e))
            })?;
            resolver.insert(
                identifier.clone(),
                Resolution {
                    tenant_key: Some(key),
                    status: entry.status,
                },
            );
        }
        Ok(resolver)
    }

    /// Picks the tenant identifier to open.
    ///
    /// An explicit identifier always wins; otherwise a single configured
    /// tenant is used implicitly.
    pub fn select_tenant(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(identifier) = explicit {
            return Ok(identifier.to_string());
        }
        let mut identifiers = self.tenants.keys();
        match (identifiers.next(), identifiers.next()) {
            (Some(only), None) => Ok(only.clone()),
            _ => Err(Error::NoTenantSelected {
                configured: self.tenants.keys().cloned().collect(),
            }),
        }
    }
}

/// Resolves the data directory: explicit flag (or `CLINICSYNC_DIR`, via
/// clap), else the platform's local data directory.
pub fn resolve_data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    dirs::data_local_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| {
            Error::Config("cannot determine a data directory; pass --dir".to_string())
        })
}

pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DB_FILE_NAME)
}

pub fn log_path(data_dir: &Path) -> PathBuf {
    data_dir.join(LOG_FILE_NAME)
}

/// Lock file guarding the drain of one tenant's queue.
pub fn lock_path(data_dir: &Path, tenant: &TenantKey) -> PathBuf {
    data_dir.join(format!("{}.lock", tenant))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
