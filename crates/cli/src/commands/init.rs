// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use serde::Serialize;

use clinicsync_core::{Database, TenantKey, TenantStatus};

use super::{print_json, Context};
use crate::config::{db_path, Config, TenantEntry};
use crate::error::{Error, Result};

#[derive(Debug, Serialize)]
struct InitReport {
    data_dir: String,
    remote: String,
    tenants: Vec<String>,
}

/// Creates or amends `config.toml` and makes sure the database exists.
///
/// Re-running `init` is safe: existing settings are kept unless a flag
/// overrides them.
pub fn run(
    ctx: &Context,
    remote: Option<String>,
    token: Option<String>,
    tenant_key: Option<String>,
) -> Result<()> {
    let mut config = match Config::load(&ctx.data_dir) {
        Ok(config) => config,
        Err(Error::NotInitialized) => Config::default(),
        Err(e) => return Err(e),
    };

    if let Some(url) = remote {
        config.remote.url = url;
    }
    if token.is_some() {
        config.remote.token = token;
    }

    match (&ctx.tenant, tenant_key) {
        (Some(identifier), key) => {
            let key = TenantKey::new(key.unwrap_or_else(|| identifier.clone()))?;
            config.tenants.insert(
                identifier.clone(),
                TenantEntry {
                    key: key.to_string(),
                    status: TenantStatus::Active,
                },
            );
        }
        (None, Some(_)) => {
            return Err(Error::NoTenantSelected {
                configured: config.tenants.keys().cloned().collect(),
            })
        }
        (None, None) => {}
    }

    config.save(&ctx.data_dir)?;
    Database::open(&db_path(&ctx.data_dir))?;
    tracing::debug!(data_dir = %ctx.data_dir.display(), "initialized");

    print_json(&InitReport {
        data_dir: ctx.data_dir.display().to_string(),
        remote: config.remote.url.clone(),
        tenants: config.tenants.keys().cloned().collect(),
    })
}

#[cfg(test)]
#[path = "init_tests.rs"]
mod tests;
