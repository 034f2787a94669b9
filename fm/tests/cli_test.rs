//! CLI integration tests
//!
//! Each test spawns the fm binary the way a user would run it.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::TempDir;

fn fm() -> Command {
    Command::cargo_bin("fm").expect("fm binary builds")
}

fn write_config(dir: &TempDir, yaml: &str) -> std::path::PathBuf {
    let path = dir.path().join("fedmgr.yml");
    fs::write(&path, yaml).expect("Failed to write config");
    path
}

#[test]
fn test_no_args_prints_help() {
    fm().assert().success().stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_validate_accepts_good_config() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = write_config(
        &dir,
        "federation:\n  name: cli-check\nfederate:\n  name: alpha\n  lookahead: 0.5\n",
    );

    fm().arg("-c")
        .arg(&config)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("cli-check"));
}

#[test]
fn test_validate_json_output_parses() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = write_config(&dir, "federation:\n  name: cli-json\n");

    let output = fm()
        .arg("-c")
        .arg(&config)
        .arg("validate")
        .arg("--format")
        .arg("json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: serde_json::Value = serde_json::from_slice(&output).expect("stdout is JSON");
    assert_eq!(value["federation"]["name"], "cli-json");
    assert_eq!(value["federate"]["lookahead"], 0.1);
}

#[test]
fn test_validate_rejects_bad_config() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = write_config(&dir, "federate:\n  lookahead: -2.0\n");

    fm().arg("-c")
        .arg(&config)
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("lookahead"));
}

#[test]
fn test_missing_config_file_fails() {
    fm().arg("-c")
        .arg("/nonexistent/fedmgr.yml")
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
#[serial]
fn test_run_with_echo_peer_completes() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = write_config(
        &dir,
        "federation:\n  name: cli-demo\nfederate:\n  name: primary\n",
    );

    let output = fm()
        .arg("-c")
        .arg(&config)
        .arg("run")
        .arg("--echo")
        .arg("--stop")
        .arg("2")
        .arg("--format")
        .arg("json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let summary: serde_json::Value = serde_json::from_slice(&output).expect("stdout is JSON");
    assert_eq!(summary["federation"], "cli-demo");
    assert_eq!(summary["federate"], "primary");
    assert_eq!(summary["steps"], 2);
    assert_eq!(summary["sent"], 2);
    assert_eq!(summary["received"], 1);
    assert_eq!(summary["echoed"], 2);
    assert_eq!(summary["final-time"], 2.0);
}

#[test]
#[serial]
fn test_run_solo_text_summary() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = write_config(&dir, "federate:\n  name: solo\n");

    fm().arg("-c")
        .arg(&config)
        .arg("run")
        .arg("--stop")
        .arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains("Federation run complete"))
        .stdout(predicate::str::contains("solo"));
}

#[test]
#[serial]
fn test_probe_reports_unserved_port() {
    // Port 1 is never served in the test environment
    fm().arg("probe")
        .arg("--port")
        .arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains("No coordination process"));
}
