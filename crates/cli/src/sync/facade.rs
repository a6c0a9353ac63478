// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Entity façades: the only surface the application touches.
//!
//! Writes are optimistic. Each one commits the local record change and the
//! matching queue entry in a single transaction and returns immediately,
//! online or not; the sync processor takes it from there.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use clinicsync_core::id::{generate_temp_id, is_temp_id};
use clinicsync_core::record::{merge_payload, require_object, without_id};
use clinicsync_core::{EntityType, Error, Operation, QueueEntry, Record, Result, SyncMetadata};

use super::session::SyncSession;

/// What a delete did to the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// A `delete` entry was appended.
    Queued { entry_id: String },
    /// The record was never sent; its pending entries were dropped instead.
    CancelledPending { cancelled: usize },
}

/// Façade over one entity type.
#[derive(Clone)]
pub struct Collection {
    session: SyncSession,
    entity_type: EntityType,
}

impl Collection {
    pub fn new(session: SyncSession, entity_type: EntityType) -> Self {
        Collection {
            session,
            entity_type,
        }
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// Stores `data` under a fresh temporary id and queues a create.
    pub fn create(&self, data: Value) -> Result<Record> {
        require_object(&data, "create payload")?;
        let payload = without_id(&data);
        let id = generate_temp_id();
        let entity_type = &self.entity_type;

        let record = self.session.with_db(|db| {
            db.atomically(|records, queue| {
                let record = records.save(Record::pending(
                    entity_type.clone(),
                    id.clone(),
                    payload.clone(),
                ))?;
                queue.add_operation(entity_type, &id, Operation::Create, Some(&payload))?;
                Ok(record)
            })
        })?;
        tracing::debug!(%entity_type, id = %record.id, "created locally");
        Ok(record)
    }

    /// Merges `patch` into the record and queues an update carrying the patch.
    pub fn update(&self, id: &str, patch: Value) -> Result<Record> {
        require_object(&patch, "update patch")?;
        let patch = without_id(&patch);
        let entity_type = &self.entity_type;

        self.session.with_db(|db| {
            db.atomically(|records, queue| {
                let record = records.update(entity_type, id, &patch)?;
                queue.add_operation(entity_type, id, Operation::Update, Some(&patch))?;
                Ok(record)
            })
        })
    }

    /// Removes the record locally.
    ///
    /// A record that only exists locally (temporary id, nothing of its
    /// lineage ever sent) has its pending entries cancelled instead of
    /// queueing a delete the server could not resolve.
    pub fn delete(&self, id: &str) -> Result<DeleteOutcome> {
        let entity_type = &self.entity_type;

        let outcome = self.session.with_db(|db| {
            db.atomically(|records, queue| {
                if !records.remove(entity_type, id)? {
                    return Err(Error::not_found(entity_type.as_str(), id));
                }
                let lineage = queue.lineage(entity_type, id)?;
                if is_temp_id(id) && lineage.iter().all(QueueEntry::is_untouched) {
                    let cancelled = queue.cancel_lineage(entity_type, id)?;
                    return Ok(DeleteOutcome::CancelledPending { cancelled });
                }
                let entry_id = queue.add_operation(entity_type, id, Operation::Delete, None)?;
                Ok(DeleteOutcome::Queued { entry_id })
            })
        })?;
        tracing::debug!(%entity_type, id, ?outcome, "deleted locally");
        Ok(outcome)
    }

    pub fn get(&self, id: &str) -> Result<Option<Record>> {
        self.session
            .with_db(|db| db.records().get_by_id(&self.entity_type, id))
    }

    /// Every record of this type, in insertion order.
    pub fn list(&self) -> Result<Vec<Record>> {
        self.session.with_db(|db| db.records().list(&self.entity_type))
    }
}

/// A domain type with a fixed entity type tag.
pub trait Entity: Serialize + DeserializeOwned {
    const ENTITY_TYPE: &'static str;
}

/// A typed record: the domain value plus its id and sync metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stored<E> {
    pub id: String,
    pub sync: SyncMetadata,
    #[serde(flatten)]
    pub entity: E,
}

impl<E: Entity> Stored<E> {
    fn from_record(record: Record) -> Result<Self> {
        Ok(Stored {
            id: record.id,
            sync: record.sync,
            entity: serde_json::from_value(record.payload)?,
        })
    }
}

/// [`Collection`] with serde conversion to and from `E`.
pub struct TypedCollection<E> {
    inner: Collection,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for TypedCollection<E> {
    fn clone(&self) -> Self {
        TypedCollection {
            inner: self.inner.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> TypedCollection<E> {
    pub fn new(inner: Collection) -> Self {
        TypedCollection {
            inner,
            _entity: PhantomData,
        }
    }

    pub fn create(&self, entity: &E) -> Result<Stored<E>> {
        let record = self.inner.create(serde_json::to_value(entity)?)?;
        Stored::from_record(record)
    }

    /// Applies a partial patch; the merged result must still decode as `E`.
    ///
    /// A patch that breaks the shape is rejected before anything is written.
    pub fn update(&self, id: &str, patch: Value) -> Result<Stored<E>> {
        let mut merged = self
            .inner
            .get(id)?
            .ok_or_else(|| Error::not_found(self.inner.entity_type().as_str(), id))?
            .payload;
        merge_payload(&mut merged, &without_id(&patch))?;
        serde_json::from_value::<E>(merged)?;
        Stored::from_record(self.inner.update(id, patch)?)
    }

    pub fn delete(&self, id: &str) -> Result<DeleteOutcome> {
        self.inner.delete(id)
    }

    pub fn get(&self, id: &str) -> Result<Option<Stored<E>>> {
        self.inner.get(id)?.map(Stored::from_record).transpose()
    }

    pub fn list(&self) -> Result<Vec<Stored<E>>> {
        self.inner
            .list()?
            .into_iter()
            .map(Stored::from_record)
            .collect()
    }
}

#[cfg(test)]
#[path = "facade_tests.rs"]
mod tests;
