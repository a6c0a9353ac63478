// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Specs for `init` and tenant selection.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;
use yare::parameterized;

fn cs(temp: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("clinicsync");
    cmd.arg("--dir")
        .arg(temp.path())
        .env_remove("CLINICSYNC_DIR")
        .env_remove("CLINICSYNC_TENANT")
        .env("RUST_LOG", "off");
    cmd
}

fn run_json(cmd: &mut Command) -> Value {
    let output = cmd.output().unwrap();
    if !output.status.success() {
        panic!("command failed: {}", String::from_utf8_lossy(&output.stderr));
    }
    serde_json::from_slice(&output.stdout).unwrap()
}

fn write_config(temp: &TempDir, content: &str) {
    fs::write(temp.path().join("config.toml"), content).unwrap();
}

const TWO_TENANTS: &str = r#"
[remote]
url = "http://127.0.0.1:1"

[tenants.acme]
key = "t_acme"

[tenants.bolt]
key = "t_bolt"
"#;

// =============================================================================
// init
// =============================================================================

#[test]
fn init_writes_config_and_database() {
    let temp = TempDir::new().unwrap();
    cs(&temp)
        .args(["--tenant", "acme", "init", "--remote", "http://127.0.0.1:1"])
        .assert()
        .success();

    assert!(temp.path().join("config.toml").exists());
    assert!(temp.path().join("clinicsync.db").exists());
    let config = fs::read_to_string(temp.path().join("config.toml")).unwrap();
    assert!(config.contains("http://127.0.0.1:1"));
    assert!(config.contains("[tenants.acme]"));
}

#[test]
fn init_twice_keeps_existing_tenants() {
    let temp = TempDir::new().unwrap();
    cs(&temp).args(["--tenant", "acme", "init"]).assert().success();
    cs(&temp).args(["--tenant", "bolt", "init"]).assert().success();

    let config = fs::read_to_string(temp.path().join("config.toml")).unwrap();
    assert!(config.contains("[tenants.acme]"));
    assert!(config.contains("[tenants.bolt]"));
}

#[test]
fn init_tenant_key_without_tenant_fails() {
    let temp = TempDir::new().unwrap();
    cs(&temp)
        .args(["init", "--tenant-key", "t_acme"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no tenant selected"));
}

#[parameterized(
    space = { "bad key" },
    slash = { "a/b" },
)]
fn init_rejects_invalid_tenant_key(key: &str) {
    let temp = TempDir::new().unwrap();
    cs(&temp)
        .args(["--tenant", "acme", "init", "--tenant-key", key])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid tenant key"));
}

// =============================================================================
// Selection
// =============================================================================

#[test]
fn single_tenant_is_implicit() {
    let temp = TempDir::new().unwrap();
    cs(&temp).args(["--tenant", "acme", "init"]).assert().success();

    let status = run_json(cs(&temp).arg("status"));
    assert_eq!(status["tenant"], "acme");
}

#[test]
fn many_tenants_need_a_selection() {
    let temp = TempDir::new().unwrap();
    write_config(&temp, TWO_TENANTS);

    cs(&temp)
        .args(["list", "kennels"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no tenant selected"))
        .stderr(predicate::str::contains("acme, bolt"));
}

#[test]
fn tenant_can_come_from_environment() {
    let temp = TempDir::new().unwrap();
    write_config(&temp, TWO_TENANTS);

    let status = run_json(cs(&temp).env("CLINICSYNC_TENANT", "bolt").arg("status"));
    assert_eq!(status["tenant"], "t_bolt");
}

#[test]
fn tenants_do_not_see_each_other() {
    let temp = TempDir::new().unwrap();
    write_config(&temp, TWO_TENANTS);

    run_json(cs(&temp).args(["--tenant", "acme", "create", "kennels", r#"{"name":"A"}"#]));

    let acme = run_json(cs(&temp).args(["--tenant", "acme", "list", "kennels"]));
    assert_eq!(acme.as_array().unwrap().len(), 1);
    let bolt = run_json(cs(&temp).args(["--tenant", "bolt", "list", "kennels"]));
    assert_eq!(bolt, Value::Array(vec![]));
}

#[parameterized(
    suspended = { "suspended" },
    unknown = { "unknown" },
)]
fn unavailable_tenant_is_refused(status: &str) {
    let temp = TempDir::new().unwrap();
    write_config(
        &temp,
        &format!(
            "[tenants.acme]\nkey = \"t_acme\"\nstatus = \"{}\"\n",
            status
        ),
    );

    cs(&temp)
        .args(["create", "kennels", r#"{"name":"A"}"#])
        .assert()
        .failure()
        .stderr(predicate::str::contains("tenant unavailable for 'acme'"));
}

#[test]
fn unconfigured_tenant_is_refused() {
    let temp = TempDir::new().unwrap();
    write_config(&temp, TWO_TENANTS);

    cs(&temp)
        .args(["--tenant", "nobody", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("tenant unavailable for 'nobody'"));
}
