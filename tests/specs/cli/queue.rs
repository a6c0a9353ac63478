// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Specs for `sync`, `queue`, `retry`, `requeue` and `discard` against the
//! stub resource server.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use fs2::FileExt;
use predicates::prelude::*;
use serde_json::Value;
use specs::StubServer;
use tempfile::TempDir;

// =============================================================================
// Helpers
// =============================================================================

fn cs(temp: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("clinicsync");
    cmd.arg("--dir")
        .arg(temp.path())
        .env_remove("CLINICSYNC_DIR")
        .env_remove("CLINICSYNC_TENANT")
        .env_remove("HTTP_PROXY")
        .env_remove("http_proxy")
        .env_remove("ALL_PROXY")
        .env_remove("all_proxy")
        .env("NO_PROXY", "127.0.0.1")
        .env("RUST_LOG", "off");
    cmd
}

fn init_with(stub: &StubServer) -> TempDir {
    let temp = TempDir::new().unwrap();
    cs(&temp)
        .args(["--tenant", "acme", "init", "--remote", stub.url()])
        .args(["--tenant-key", "t_acme"])
        .assert()
        .success();
    temp
}

fn run_json(temp: &TempDir, args: &[&str]) -> Value {
    let output = cs(temp).args(args).output().unwrap();
    if !output.status.success() {
        panic!(
            "clinicsync {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    serde_json::from_slice(&output.stdout).unwrap()
}

fn id_of(record: &Value) -> String {
    record["id"].as_str().unwrap().to_string()
}

// =============================================================================
// Successful sync
// =============================================================================

#[test]
fn sync_adopts_server_id() {
    let stub = StubServer::resources("invoices");
    let temp = init_with(&stub);
    let temp_id = id_of(&run_json(&temp, &["create", "kennels", r#"{"name":"Run A"}"#]));

    let report = run_json(&temp, &["sync"]);
    assert_eq!(report["online"], true);
    assert_eq!(report["completed"], 1);
    assert_eq!(report["remapped"], 1);
    assert_eq!(report["counters"]["synced_count"], 1);
    assert_eq!(report["counters"]["pending_count"], 0);

    let record = run_json(&temp, &["get", "kennels", "42"]);
    assert_eq!(record["payload"]["name"], "Run A");
    assert_eq!(record["sync"]["status"], "synced");
    cs(&temp).args(["get", "kennels", &temp_id]).assert().failure();
}

#[test]
fn sync_sends_tenant_and_idempotency_key() {
    let stub = StubServer::resources("invoices");
    let temp = init_with(&stub);
    run_json(&temp, &["create", "kennels", r#"{"name":"Run A"}"#]);
    let entry_id = run_json(&temp, &["queue"])[0]["id"]
        .as_str()
        .unwrap()
        .to_string();

    run_json(&temp, &["sync"]);

    let requests = stub.api_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].header("x-tenant-key"), Some("t_acme"));
    assert_eq!(requests[0].header("idempotency-key"), Some(entry_id.as_str()));
}

#[test]
fn offline_edits_replay_in_order() {
    let stub = StubServer::resources("invoices");
    let temp = init_with(&stub);
    let id = id_of(&run_json(&temp, &["create", "kennels", r#"{"name":"Run A"}"#]));
    run_json(&temp, &["update", "kennels", &id, r#"{"capacity":3}"#]);
    run_json(&temp, &["sync", "--offline"]);
    assert!(stub.api_calls().is_empty());

    run_json(&temp, &["sync"]);
    assert_eq!(
        stub.api_calls(),
        vec!["POST /api/kennels", "PATCH /api/kennels/42"]
    );

    let record = run_json(&temp, &["get", "kennels", "42"]);
    assert_eq!(record["payload"]["capacity"], 3);
}

#[test]
fn delete_of_synced_record_reaches_server() {
    let stub = StubServer::resources("invoices");
    let temp = init_with(&stub);
    run_json(&temp, &["create", "kennels", r#"{"name":"Run A"}"#]);
    run_json(&temp, &["sync"]);

    let outcome = run_json(&temp, &["delete", "kennels", "42"]);
    assert_eq!(outcome["outcome"], "queued");
    run_json(&temp, &["sync"]);

    assert_eq!(
        stub.api_calls(),
        vec!["POST /api/kennels", "DELETE /api/kennels/42"]
    );
    let status = run_json(&temp, &["status"]);
    assert_eq!(status["counters"]["pending_count"], 0);
}

// =============================================================================
// Failed entries
// =============================================================================

fn failed_create(temp: &TempDir) -> (String, String) {
    let id = id_of(&run_json(temp, &["create", "invoices", r#"{"total":-1}"#]));
    let report = run_json(temp, &["sync"]);
    assert_eq!(report["failed"], 1);
    let failed = run_json(temp, &["queue", "--failed"]);
    let entry_id = failed[0]["id"].as_str().unwrap().to_string();
    (id, entry_id)
}

#[test]
fn rejected_create_needs_attention() {
    let stub = StubServer::resources("invoices");
    let temp = init_with(&stub);
    let (id, _) = failed_create(&temp);

    let failed = run_json(&temp, &["queue", "--failed"]);
    assert_eq!(failed.as_array().unwrap().len(), 1);
    assert_eq!(failed[0]["terminal"], true);
    assert!(failed[0]["last_error"].as_str().unwrap().contains("422"));

    let record = run_json(&temp, &["get", "invoices", &id]);
    assert_eq!(record["sync"]["status"], "error");
    let status = run_json(&temp, &["status"]);
    assert_eq!(status["counters"]["error_count"], 1);
}

#[test]
fn rejection_does_not_block_other_records() {
    let stub = StubServer::resources("invoices");
    let temp = init_with(&stub);
    run_json(&temp, &["create", "invoices", r#"{"total":-1}"#]);
    run_json(&temp, &["create", "kennels", r#"{"name":"Run A"}"#]);

    let report = run_json(&temp, &["sync"]);
    assert_eq!(report["failed"], 1);
    assert_eq!(report["completed"], 1);
    assert_eq!(report["counters"]["synced_count"], 1);
}

#[test]
fn retry_leaves_terminal_entries_alone() {
    let stub = StubServer::resources("invoices");
    let temp = init_with(&stub);
    failed_create(&temp);

    let report = run_json(&temp, &["retry"]);
    assert_eq!(report["reset"], 0);
    let failed = run_json(&temp, &["queue", "--failed"]);
    assert_eq!(failed.as_array().unwrap().len(), 1);
}

#[test]
fn requeue_restores_pending() {
    let stub = StubServer::resources("invoices");
    let temp = init_with(&stub);
    let (id, entry_id) = failed_create(&temp);

    let entry = run_json(&temp, &["requeue", &entry_id]);
    assert_eq!(entry["status"], "pending");
    assert_eq!(entry["attempts"], 0);
    assert_eq!(entry["terminal"], false);

    let record = run_json(&temp, &["get", "invoices", &id]);
    assert_eq!(record["sync"]["status"], "pending");
    let status = run_json(&temp, &["status"]);
    assert_eq!(status["counters"]["error_count"], 0);
    assert_eq!(status["counters"]["pending_count"], 1);
}

#[test]
fn requeue_of_pending_entry_fails() {
    let stub = StubServer::resources("invoices");
    let temp = init_with(&stub);
    run_json(&temp, &["create", "kennels", r#"{"name":"Run A"}"#]);
    let entry_id = run_json(&temp, &["queue"])[0]["id"]
        .as_str()
        .unwrap()
        .to_string();

    cs(&temp)
        .args(["requeue", &entry_id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid queue transition"));
}

#[test]
fn discard_drops_failed_entry() {
    let stub = StubServer::resources("invoices");
    let temp = init_with(&stub);
    let (_, entry_id) = failed_create(&temp);

    let entry = run_json(&temp, &["discard", &entry_id]);
    assert_eq!(entry["id"], entry_id.as_str());

    let failed = run_json(&temp, &["queue", "--failed"]);
    assert_eq!(failed, Value::Array(vec![]));
}

#[test]
fn discard_unknown_entry_fails() {
    let stub = StubServer::resources("invoices");
    let temp = init_with(&stub);
    cs(&temp)
        .args(["discard", "q_missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("queue entry not found: q_missing"));
}

#[test]
fn discarding_failed_create_drops_later_edits() {
    let stub = StubServer::resources("invoices");
    let temp = init_with(&stub);
    let id = id_of(&run_json(&temp, &["create", "invoices", r#"{"total":-1}"#]));
    run_json(&temp, &["update", "invoices", &id, r#"{"total":5}"#]);
    let report = run_json(&temp, &["sync"]);
    assert_eq!(report["failed"], 1);
    let entry_id = run_json(&temp, &["queue", "--failed"])[0]["id"]
        .as_str()
        .unwrap()
        .to_string();

    run_json(&temp, &["discard", &entry_id]);

    assert_eq!(run_json(&temp, &["queue"]), Value::Array(vec![]));
    run_json(&temp, &["sync"]);
    assert_eq!(stub.api_calls(), vec!["POST /api/invoices"]);
}

// =============================================================================
// Locking
// =============================================================================

fn hold_tenant_lock(temp: &TempDir) -> fs::File {
    let lock = fs::File::create(temp.path().join("t_acme.lock")).unwrap();
    lock.try_lock_exclusive().unwrap();
    lock
}

#[test]
fn sync_refuses_while_tenant_is_locked() {
    let stub = StubServer::resources("invoices");
    let temp = init_with(&stub);
    run_json(&temp, &["create", "kennels", r#"{"name":"Run A"}"#]);
    let _held = hold_tenant_lock(&temp);

    cs(&temp)
        .args(["sync"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is locked"))
        .stderr(predicate::str::contains("already draining"));
    assert!(stub.api_calls().is_empty());
}

#[test]
fn retry_refuses_while_tenant_is_locked() {
    let stub = StubServer::resources("invoices");
    let temp = init_with(&stub);
    let _held = hold_tenant_lock(&temp);

    cs(&temp)
        .args(["retry"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is locked"));
}

#[test]
fn lock_is_released_after_sync() {
    let stub = StubServer::resources("invoices");
    let temp = init_with(&stub);
    run_json(&temp, &["sync"]);
    run_json(&temp, &["sync"]);
}
