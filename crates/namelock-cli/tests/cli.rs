//! Command-line behaviour of the `namelock` binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn namelock(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("namelock").expect("binary should build");
    cmd.env("NAMELOCK_CONFIG", config_dir.path().join("config.toml"))
        .env_remove("NAMELOCK_TICK_MS")
        .env_remove("NAMELOCK_REAPER_MS")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_config_path_honours_env() {
    let dir = TempDir::new().unwrap();
    namelock(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_show_prints_defaults() {
    let dir = TempDir::new().unwrap();
    namelock(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tick_interval_ms = 10"))
        .stdout(predicate::str::contains("[logging]"));
}

#[test]
fn test_config_set_then_get() {
    let dir = TempDir::new().unwrap();
    namelock(&dir)
        .args(["config", "set", "locks.reaper_interval_ms", "40"])
        .assert()
        .success();

    assert!(dir.path().join("config.toml").exists());
    namelock(&dir)
        .args(["config", "get", "locks.reaper_interval_ms"])
        .assert()
        .success()
        .stdout("40\n");
}

#[test]
fn test_env_override_is_not_persisted() {
    let dir = TempDir::new().unwrap();
    namelock(&dir)
        .env("NAMELOCK_TICK_MS", "5")
        .args(["config", "set", "logging.filter", "namelock=debug"])
        .assert()
        .success();

    let saved = fs::read_to_string(dir.path().join("config.toml")).unwrap();
    assert!(saved.contains("tick_interval_ms = 10"));
    assert!(saved.contains("namelock=debug"));
}

#[test]
fn test_config_list_shows_every_key() {
    let dir = TempDir::new().unwrap();
    namelock(&dir)
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("locks.tick_interval_ms = 10"))
        .stdout(predicate::str::contains("locks.event_capacity = 256"))
        .stdout(predicate::str::contains("logging.filter = namelock=info"));
}

#[test]
fn test_unknown_key_reports_code() {
    let dir = TempDir::new().unwrap();
    namelock(&dir)
        .args(["config", "get", "locks.bogus"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E601"))
        .stderr(predicate::str::contains("namelock config list"));
}

#[test]
fn test_broken_config_file_is_reported() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("config.toml"), "[locks]\ntick_interval_ms = 0\n").unwrap();

    namelock(&dir)
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E311"));
}

#[test]
fn test_demo_contention_text() {
    let dir = TempDir::new().unwrap();
    namelock(&dir)
        .args(["demo", "contention", "--hold-ms", "50"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lock_acquired"))
        .stdout(predicate::str::contains("lock_released"))
        .stdout(predicate::str::contains("Outcome: second task acquired"));
}

#[test]
fn test_demo_timeout_json() {
    let dir = TempDir::new().unwrap();
    let output = namelock(&dir)
        .args(["demo", "timeout", "--hold-ms", "60", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let document: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(document["scenario"], "timeout");
    assert!(
        document["outcome"]
            .as_str()
            .unwrap()
            .contains("unable to acquire lock for: resource")
    );
    let types: Vec<_> = document["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event_type"].as_str().unwrap().to_string())
        .collect();
    assert!(types.contains(&"acquire_timed_out".to_string()));
}

#[test]
fn test_demo_expiry() {
    let dir = TempDir::new().unwrap();
    namelock(&dir)
        .args(["demo", "expiry", "--hold-ms", "50"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lock_expired"))
        .stdout(predicate::str::contains("the waiter took over"));
}

#[test]
fn test_demo_fifo_order() {
    let dir = TempDir::new().unwrap();
    namelock(&dir)
        .args(["demo", "fifo", "--quiet"])
        .assert()
        .success()
        .stdout("Outcome: served in order: waiter-1, waiter-2, waiter-3\n");
}

#[test]
fn test_demo_rejects_zero_hold() {
    let dir = TempDir::new().unwrap();
    namelock(&dir)
        .args(["demo", "contention", "--hold-ms", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E800"));
}
