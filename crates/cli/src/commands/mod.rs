// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

pub mod init;
pub mod queue;
pub mod records;
pub mod sync;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use clinicsync_core::{EntityType, SystemClock};

use crate::config::{db_path, Config};
use crate::error::Result;
use crate::sync::SyncSession;

/// What every command gets from the global flags.
#[derive(Debug, Clone)]
pub struct Context {
    pub data_dir: PathBuf,
    pub tenant: Option<String>,
}

impl Context {
    pub fn config(&self) -> Result<Config> {
        Config::load(&self.data_dir)
    }

    /// Opens the selected tenant's session.
    pub fn open_session(&self) -> Result<(SyncSession, Config)> {
        let config = self.config()?;
        let identifier = config.select_tenant(self.tenant.as_deref())?;
        let session = SyncSession::open(
            &config.resolver()?,
            &identifier,
            &db_path(&self.data_dir),
            Arc::new(SystemClock),
        )?;
        Ok((session, config))
    }
}

/// Writes `value` to stdout as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn parse_entity_type(entity: &str) -> Result<EntityType> {
    Ok(EntityType::new(entity)?)
}

/// Parses a JSON argument.
pub fn parse_json_arg(raw: &str) -> Result<Value> {
    Ok(serde_json::from_str(raw)?)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
