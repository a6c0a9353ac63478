// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Record types held by the local store.
//!
//! A [`Record`] is one domain entity (a kennel, a SOAP template, a boarding
//! stay) as the client currently believes it to be, tagged with the sync
//! metadata the engine needs to reconcile it with the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

const MAX_ENTITY_TYPE_LEN: usize = 64;

/// Domain type tag, e.g. `kennels` or `soapTemplates`.
///
/// Together with the tenant key it forms the storage partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityType(String);

impl EntityType {
    /// Validates and wraps an entity type tag.
    pub fn new(tag: impl Into<String>) -> Result<Self> {
        let tag = tag.into();
        let valid = !tag.is_empty()
            && tag.len() <= MAX_ENTITY_TYPE_LEN
            && tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(EntityType(tag))
        } else {
            Err(Error::InvalidEntityType(tag))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        EntityType::new(s)
    }
}

impl TryFrom<String> for EntityType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        EntityType::new(value)
    }
}

impl From<EntityType> for String {
    fn from(value: EntityType) -> Self {
        value.0
    }
}

/// Reconciliation state of a local record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Matches what the server last acknowledged.
    Synced,
    /// Has local changes the server has not acknowledged yet.
    Pending,
    /// A mutation failed permanently; needs attention.
    Error,
}

impl SyncStatus {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Pending => "pending",
            SyncStatus::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "synced" => Ok(SyncStatus::Synced),
            "pending" => Ok(SyncStatus::Pending),
            "error" => Ok(SyncStatus::Error),
            _ => Err(Error::InvalidInput(format!("invalid sync status: '{s}'"))),
        }
    }
}

/// Kind of mutation carried by a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Returns the string representation used in storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            _ => Err(Error::InvalidInput(format!("invalid operation: '{s}'"))),
        }
    }
}

/// Sync bookkeeping attached to every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub last_modified: DateTime<Utc>,
    pub status: SyncStatus,
}

/// A domain entity as stored locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Server id, or a `temp_` id while the create is unacknowledged.
    pub id: String,
    pub entity_type: EntityType,
    /// Domain fields. Always a JSON object.
    pub payload: Value,
    pub sync: SyncMetadata,
}

impl Record {
    /// Creates a record in the `pending` state.
    ///
    /// `last_modified` is provisional; the store stamps it on save.
    pub fn pending(entity_type: EntityType, id: impl Into<String>, payload: Value) -> Self {
        Record {
            id: id.into(),
            entity_type,
            payload,
            sync: SyncMetadata {
                last_modified: Utc::now(),
                status: SyncStatus::Pending,
            },
        }
    }

    /// Overrides the sync status the store will persist.
    pub fn with_status(mut self, status: SyncStatus) -> Self {
        self.sync.status = status;
        self
    }
}

/// Returns the payload as an object, or an input error naming `what`.
pub fn require_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| Error::InvalidInput(format!("{what} must be a JSON object")))
}

/// Shallow-merges the top-level fields of `patch` into `base`.
pub fn merge_payload(base: &mut Value, patch: &Value) -> Result<()> {
    let patch = require_object(patch, "patch")?;
    let base = base
        .as_object_mut()
        .ok_or_else(|| Error::CorruptedData("stored payload is not a JSON object".to_string()))?;
    for (key, value) in patch {
        base.insert(key.clone(), value.clone());
    }
    Ok(())
}

/// Replaces every JSON string equal to `old` with `new`, at any depth.
///
/// Returns true if anything changed.
pub fn rewrite_references(value: &mut Value, old: &str, new: &str) -> bool {
    match value {
        Value::String(s) if s == old => {
            *s = new.to_string();
            true
        }
        Value::Array(items) => items
            .iter_mut()
            .fold(false, |changed, item| rewrite_references(item, old, new) | changed),
        Value::Object(map) => map
            .values_mut()
            .fold(false, |changed, item| rewrite_references(item, old, new) | changed),
        _ => false,
    }
}

/// Strips the `id` field; record ids live beside the payload, not inside it.
pub fn without_id(payload: &Value) -> Value {
    let mut payload = payload.clone();
    if let Some(map) = payload.as_object_mut() {
        map.remove("id");
    }
    payload
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
