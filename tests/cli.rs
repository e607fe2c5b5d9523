//! Integration tests for the `devicefarm-cli` command line surface.
//!
//! None of these reach the network: they stop at argument parsing,
//! configuration loading or local validation.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const ENV_VARS: &[&str] = &[
    "DF_PROJECT",
    "DF_DEVICE",
    "DF_DEVICE_POOL",
    "DF_RUN",
    "DF_JOB",
    "DF_SUITE",
    "DF_UPLOAD",
    "DF_RUN_NAME",
    "DF_APP",
    "DF_APP_FILE",
    "DF_APP_TYPE",
    "DF_TEST",
    "DF_TEST_FILE",
    "DF_TEST_TYPE",
    "DF_TEST_SPEC",
    "DF_TEST_SPEC_FILE",
    "DF_ARTIFACT_TYPE",
    "DF_REGION",
    "RUST_LOG",
];

fn devicefarm(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("devicefarm-cli").expect("binary is built");
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.current_dir(dir).env("HOME", dir);
    cmd
}

#[test]
fn test_help_lists_commands() {
    let temp_dir = TempDir::new().expect("temp dir");
    let assert = devicefarm(temp_dir.path()).arg("--help").assert().success();
    let help = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();

    for command in [
        "list", "create", "upload", "download", "schedule", "status", "report", "info",
    ] {
        assert!(help.contains(command), "help is missing {command}:\n{help}");
    }
}

#[test]
fn test_version() {
    let temp_dir = TempDir::new().expect("temp dir");
    devicefarm(temp_dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_subcommand_is_a_usage_error() {
    let temp_dir = TempDir::new().expect("temp dir");
    devicefarm(temp_dir.path()).assert().code(2);
}

#[test]
fn test_missing_explicit_config_fails() {
    let temp_dir = TempDir::new().expect("temp dir");
    devicefarm(temp_dir.path())
        .args(["--config", "does-not-exist.toml", "list", "projects"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn test_invalid_config_fails() {
    let temp_dir = TempDir::new().expect("temp dir");
    std::fs::write(
        temp_dir.path().join("devicefarm.toml"),
        "[report]\non_download_error = \"sometimes\"\n",
    )
    .expect("write config");

    devicefarm(temp_dir.path())
        .args(["list", "projects"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[test]
fn test_unknown_artifact_type_is_rejected() {
    let temp_dir = TempDir::new().expect("temp dir");
    devicefarm(temp_dir.path())
        .args(["list", "artifacts", "--run", "arn:run", "--type", "VIDEO"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown artifact type"));
}

#[test]
fn test_schedule_requires_test_type() {
    let temp_dir = TempDir::new().expect("temp dir");
    devicefarm(temp_dir.path())
        .args(["schedule", "--project", "arn:project", "--name", "nightly"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--test-type"));
}

#[test]
fn test_list_suites_needs_run_or_job() {
    let temp_dir = TempDir::new().expect("temp dir");
    devicefarm(temp_dir.path())
        .args(["list", "suites"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Either --run or --job is required"));
}

#[test]
fn test_rust_log_controls_debug_output() {
    let temp_dir = TempDir::new().expect("temp dir");
    let args = ["--region", "eu-west-1", "list", "suites"];

    devicefarm(temp_dir.path())
        .args(args)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Using region").not());

    devicefarm(temp_dir.path())
        .env("RUST_LOG", "debug")
        .args(args)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Using region eu-west-1"));

    devicefarm(temp_dir.path())
        .env("RUST_LOG", "warn")
        .arg("-v")
        .args(args)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Using region eu-west-1"));
}

#[test]
fn test_out_of_range_backoff_is_rejected() {
    let temp_dir = TempDir::new().expect("temp dir");
    std::fs::write(
        temp_dir.path().join("devicefarm.toml"),
        "[polling]\nbackoff = 1e20\n",
    )
    .expect("write config");

    devicefarm(temp_dir.path())
        .args(["list", "projects"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("polling.backoff must be between"));
}
