//! End-to-end CLI tests for the harvester binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn harvester(db_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("harvester").unwrap();
    cmd.arg("--db")
        .arg(db_dir.path().join("ledger.db").as_os_str());
    cmd
}

/// --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let mut cmd = Command::cargo_bin("harvester").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Harvest paginated catalogs"));
}

/// --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let mut cmd = Command::cargo_bin("harvester").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("harvester"));
}

/// Invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    let mut cmd = Command::cargo_bin("harvester").unwrap();
    cmd.arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

/// Without a config file a harvest run is refused with a helpful message.
#[test]
fn test_binary_run_requires_config() {
    let dir = TempDir::new().unwrap();
    harvester(&dir)
        .arg("-q")
        .assert()
        .failure()
        .stderr(predicate::str::contains("config"));
}

/// --report against a fresh ledger prints the (empty) status breakdown.
#[test]
fn test_binary_report_on_fresh_ledger() {
    let dir = TempDir::new().unwrap();
    harvester(&dir)
        .args(["-q", "--report"])
        .assert()
        .success()
        .stdout(predicate::str::contains("By status:"))
        .stdout(predicate::str::contains("By category:"));
}

/// --reset-failures on a fresh ledger succeeds and resets nothing.
#[test]
fn test_binary_reset_failures_on_fresh_ledger() {
    let dir = TempDir::new().unwrap();
    harvester(&dir)
        .args(["-q", "--reset-failures"])
        .assert()
        .success();
}

/// A malformed config file fails cleanly.
#[test]
fn test_binary_malformed_config_fails() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("bad.json");
    std::fs::write(&config, "{ nope").unwrap();
    harvester(&dir)
        .arg("-q")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("parse"));
}
