// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for sync module tests.

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use clinicsync_core::{Database, EntityType, ManualClock, Operation, TenantKey};

use super::connectivity::ConnectivityMonitor;
use super::processor::SyncProcessor;
use super::remote::{RemoteApi, RemoteError, RemoteFuture, RemoteRecord};
use super::session::SyncSession;
use crate::config::SyncPolicy;

/// First id the mock server hands out.
pub const FIRST_SERVER_ID: u64 = 42;

/// One request as seen by [`MockRemote`].
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub tenant: String,
    pub operation: Operation,
    pub entity_type: String,
    /// Idempotency key for creates, resource id otherwise.
    pub key: String,
    pub payload: Option<Value>,
}

enum Scripted {
    /// Answer normally.
    Pass,
    /// Fail without touching server state.
    Fail(RemoteError),
    /// Apply the request, then lose the response.
    ApplyThenFail(RemoteError),
}

#[derive(Default)]
struct ServerState {
    /// (tenant, entity type, id) → resource.
    resources: BTreeMap<(String, String, String), Value>,
    /// Idempotency key → id it created.
    seen_keys: HashMap<String, String>,
    next_id: u64,
    calls: Vec<Call>,
    script: VecDeque<Scripted>,
    delay: Option<Duration>,
}

/// In-memory server for processor tests.
///
/// Assigns numeric ids starting at [`FIRST_SERVER_ID`], deduplicates
/// creates by idempotency key, and fails requests on demand.
#[derive(Clone)]
pub struct MockRemote {
    state: Arc<Mutex<ServerState>>,
}

impl MockRemote {
    pub fn new() -> Self {
        MockRemote {
            state: Arc::new(Mutex::new(ServerState {
                next_id: FIRST_SERVER_ID,
                ..ServerState::default()
            })),
        }
    }

    /// The next request is answered normally; lets a later failure be
    /// scripted for the second call.
    pub fn succeed_next(&self) {
        self.state.lock().unwrap().script.push_back(Scripted::Pass);
    }

    /// The next request fails with `err` and changes nothing.
    pub fn fail_next(&self, err: RemoteError) {
        self.state.lock().unwrap().script.push_back(Scripted::Fail(err));
    }

    /// The next request takes effect but the client sees `err`.
    pub fn apply_then_fail(&self, err: RemoteError) {
        self.state
            .lock()
            .unwrap()
            .script
            .push_back(Scripted::ApplyThenFail(err));
    }

    /// Every request sleeps `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn resource(&self, tenant: &str, entity_type: &str, id: &str) -> Option<Value> {
        self.state
            .lock()
            .unwrap()
            .resources
            .get(&(tenant.to_string(), entity_type.to_string(), id.to_string()))
            .cloned()
    }

    pub fn resource_count(&self) -> usize {
        self.state.lock().unwrap().resources.len()
    }

    /// Seeds a resource as if another client had created it.
    pub fn insert(&self, tenant: &str, entity_type: &str, id: &str, fields: Value) {
        self.state.lock().unwrap().resources.insert(
            (tenant.to_string(), entity_type.to_string(), id.to_string()),
            fields,
        );
    }

    /// Records the call and pops the script; `None` or `Pass` means answer normally.
    fn begin(&self, call: Call) -> (Option<Scripted>, Option<Duration>) {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        (state.script.pop_front(), state.delay)
    }

    fn status(status: u16) -> RemoteError {
        RemoteError::Status {
            status,
            message: "not found".to_string(),
        }
    }

    fn apply_create(&self, tenant: &str, entity_type: &str, key: &str, payload: &Value) -> RemoteRecord {
        let mut state = self.state.lock().unwrap();
        if let Some(id) = state.seen_keys.get(key).cloned() {
            let fields = state.resources[&(tenant.to_string(), entity_type.to_string(), id)].clone();
            return RemoteRecord::from_value(fields).unwrap();
        }
        let id = state.next_id;
        state.next_id += 1;
        let mut fields = payload.clone();
        fields["id"] = json!(id);
        state.seen_keys.insert(key.to_string(), id.to_string());
        state.resources.insert(
            (tenant.to_string(), entity_type.to_string(), id.to_string()),
            fields.clone(),
        );
        RemoteRecord::from_value(fields).unwrap()
    }

    fn apply_update(
        &self,
        tenant: &str,
        entity_type: &str,
        id: &str,
        patch: &Value,
    ) -> Result<Option<RemoteRecord>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        let key = (tenant.to_string(), entity_type.to_string(), id.to_string());
        let Some(fields) = state.resources.get_mut(&key) else {
            return Err(Self::status(404));
        };
        if let (Some(fields), Some(patch)) = (fields.as_object_mut(), patch.as_object()) {
            for (k, v) in patch {
                fields.insert(k.clone(), v.clone());
            }
        }
        Ok(Some(RemoteRecord::from_value(fields.clone()).unwrap()))
    }

    fn apply_delete(&self, tenant: &str, entity_type: &str, id: &str) {
        self.state.lock().unwrap().resources.remove(&(
            tenant.to_string(),
            entity_type.to_string(),
            id.to_string(),
        ));
    }
}

async fn pause(delay: Option<Duration>) {
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

impl RemoteApi for MockRemote {
    fn create<'a>(
        &'a self,
        tenant: &'a TenantKey,
        entity_type: &'a EntityType,
        idempotency_key: &'a str,
        payload: &'a Value,
    ) -> RemoteFuture<'a, RemoteRecord> {
        Box::pin(async move {
            let (scripted, delay) = self.begin(Call {
                tenant: tenant.to_string(),
                operation: Operation::Create,
                entity_type: entity_type.to_string(),
                key: idempotency_key.to_string(),
                payload: Some(payload.clone()),
            });
            pause(delay).await;
            match scripted {
                Some(Scripted::Fail(err)) => Err(err),
                Some(Scripted::ApplyThenFail(err)) => {
                    self.apply_create(tenant.as_str(), entity_type.as_str(), idempotency_key, payload);
                    Err(err)
                }
                Some(Scripted::Pass) | None => Ok(self.apply_create(
                    tenant.as_str(),
                    entity_type.as_str(),
                    idempotency_key,
                    payload,
                )),
            }
        })
    }

    fn update<'a>(
        &'a self,
        tenant: &'a TenantKey,
        entity_type: &'a EntityType,
        id: &'a str,
        patch: &'a Value,
    ) -> RemoteFuture<'a, Option<RemoteRecord>> {
        Box::pin(async move {
            let (scripted, delay) = self.begin(Call {
                tenant: tenant.to_string(),
                operation: Operation::Update,
                entity_type: entity_type.to_string(),
                key: id.to_string(),
                payload: Some(patch.clone()),
            });
            pause(delay).await;
            match scripted {
                Some(Scripted::Fail(err)) => Err(err),
                Some(Scripted::ApplyThenFail(err)) => {
                    self.apply_update(tenant.as_str(), entity_type.as_str(), id, patch)?;
                    Err(err)
                }
                Some(Scripted::Pass) | None => self.apply_update(tenant.as_str(), entity_type.as_str(), id, patch),
            }
        })
    }

    fn delete<'a>(
        &'a self,
        tenant: &'a TenantKey,
        entity_type: &'a EntityType,
        id: &'a str,
    ) -> RemoteFuture<'a, ()> {
        Box::pin(async move {
            let (scripted, delay) = self.begin(Call {
                tenant: tenant.to_string(),
                operation: Operation::Delete,
                entity_type: entity_type.to_string(),
                key: id.to_string(),
                payload: None,
            });
            pause(delay).await;
            match scripted {
                Some(Scripted::Fail(err)) => Err(err),
                Some(Scripted::ApplyThenFail(err)) => {
                    self.apply_delete(tenant.as_str(), entity_type.as_str(), id);
                    Err(err)
                }
                Some(Scripted::Pass) | None => {
                    self.apply_delete(tenant.as_str(), entity_type.as_str(), id);
                    Ok(())
                }
            }
        })
    }
}

pub fn network_down() -> RemoteError {
    RemoteError::Network("connection refused".to_string())
}

pub fn rejected(status: u16) -> RemoteError {
    RemoteError::Status {
        status,
        message: "rejected".to_string(),
    }
}

pub fn kennels() -> EntityType {
    EntityType::new("kennels").unwrap()
}

pub fn stays() -> EntityType {
    EntityType::new("boardingStays").unwrap()
}

pub fn test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
    ))
}

/// Session over a fresh in-memory database.
pub fn test_session(tenant: &str) -> (SyncSession, Arc<ManualClock>) {
    let clock = test_clock();
    let session = SyncSession::with_database(
        Database::open_in_memory().unwrap(),
        TenantKey::new(tenant).unwrap(),
        clock.clone(),
    )
    .unwrap();
    (session, clock)
}

/// Processor with the default policy over a fresh session.
pub fn test_processor(
    remote: MockRemote,
    online: bool,
) -> (SyncProcessor<MockRemote>, Arc<ManualClock>) {
    let (session, clock) = test_session("t_acme");
    let processor = SyncProcessor::new(
        session,
        remote,
        ConnectivityMonitor::new(online),
        SyncPolicy::default(),
    );
    (processor, clock)
}
