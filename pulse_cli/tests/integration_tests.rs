//! Integration tests for the pulse binary.
//!
//! These tests verify end-to-end behavior including:
//! - A full simulated workout from start to stop
//! - Authorization and availability failures
//! - Configuration printing and writing

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a test config directory
fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Helper to get the path to the CLI binary
fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("pulse"))
}

/// A short monitor run with an isolated config path
fn monitor(temp_dir: &TempDir) -> Command {
    let mut cmd = cli();
    cmd.arg("monitor")
        .arg("--config")
        .arg(temp_dir.path().join("config.toml"))
        .arg("--duration-secs")
        .arg("1")
        .arg("--interval-ms")
        .arg("50");
    cmd
}

#[test]
fn test_cli_help() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Real-time heart-rate workout monitor",
        ));
}

#[test]
fn test_monitor_shows_readings_then_resets() {
    let temp_dir = setup_test_dir();

    let output = monitor(&temp_dir).output().expect("Failed to run monitor");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("[Stop ]"), "no running updates in {}", stdout);
    assert!(stdout.contains("(Apple Watch) ♥"), "no readings in {}", stdout);

    let last = stdout.lines().last().unwrap();
    assert!(last.starts_with("[Start]"), "unexpected last line {}", last);
    assert!(last.contains("---"), "unexpected last line {}", last);
}

#[test]
fn test_monitor_json_output() {
    let temp_dir = setup_test_dir();

    let output = monitor(&temp_dir)
        .arg("--json")
        .output()
        .expect("Failed to run monitor");
    assert!(output.status.success());

    let updates: Vec<serde_json::Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be JSON"))
        .collect();
    assert!(!updates.is_empty());

    let readings: Vec<&serde_json::Value> = updates
        .iter()
        .filter(|u| u["pulse_trigger"] == serde_json::Value::Bool(true))
        .collect();
    assert!(!readings.is_empty());
    for reading in &readings {
        let text = reading["latest_value_text"].as_str().unwrap();
        assert!(text.parse::<u16>().is_ok(), "non-numeric reading {}", text);
    }
    assert!(readings.iter().any(|r| r["button"] == "Stop"));

    let last = updates.last().unwrap();
    assert_eq!(last["latest_value_text"], "---");
    assert_eq!(last["button"], "Start");
}

#[test]
fn test_device_override() {
    let temp_dir = setup_test_dir();

    monitor(&temp_dir)
        .arg("--device")
        .arg("Chest Strap")
        .assert()
        .success()
        .stdout(predicate::str::contains("(Chest Strap)"));
}

#[test]
fn test_denied_access_shows_not_allowed() {
    let temp_dir = setup_test_dir();

    monitor(&temp_dir)
        .arg("--deny-access")
        .assert()
        .success()
        .stdout(predicate::str::contains("not allowed"))
        .stdout(predicate::str::contains("♥").not());
}

#[test]
fn test_unavailable_platform_shows_not_available() {
    let temp_dir = setup_test_dir();

    monitor(&temp_dir)
        .arg("--unavailable")
        .assert()
        .success()
        .stdout(predicate::str::contains("not available"))
        .stdout(predicate::str::contains("[Stop").not());
}

#[test]
fn test_zero_interval_is_rejected() {
    let temp_dir = setup_test_dir();

    cli()
        .arg("monitor")
        .arg("--config")
        .arg(temp_dir.path().join("config.toml"))
        .arg("--interval-ms")
        .arg("0")
        .assert()
        .failure();
}

#[test]
fn test_config_prints_defaults() {
    let temp_dir = setup_test_dir();

    cli()
        .arg("config")
        .arg("--config")
        .arg(temp_dir.path().join("missing.toml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("[simulator]"))
        .stdout(predicate::str::contains("on_stream_failure = \"fail_session\""));
}

#[test]
fn test_config_write_then_monitor_uses_it() {
    let temp_dir = setup_test_dir();
    let config_path = temp_dir.path().join("config.toml");

    cli()
        .arg("config")
        .arg("--write")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote config"));
    assert!(config_path.exists());

    // Edit the written file and make sure monitor picks it up
    let contents = fs::read_to_string(&config_path).unwrap();
    let edited = contents.replace(
        "device_name = \"Apple Watch\"",
        "device_name = \"Bench Sensor\"",
    );
    assert_ne!(contents, edited);
    fs::write(&config_path, edited).unwrap();

    monitor(&temp_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("(Bench Sensor)"));
}
