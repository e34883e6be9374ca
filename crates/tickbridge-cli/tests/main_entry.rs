//! Integration tests for the `tickbridge` binary entry point.
//!
//! Covers usage errors, built-in defaults and the exit status when no host
//! is listening.
#![expect(clippy::expect_used, reason = "tests fail loudly on setup errors")]

use std::net::TcpListener;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

#[test]
fn help_lists_the_command_argument() {
    let mut command = cargo_bin_cmd!("tickbridge");
    command.arg("--help");
    command.assert().success().stdout(contains("COMMAND"));
}

#[test]
fn missing_command_exits_with_usage_error() {
    let mut command = cargo_bin_cmd!("tickbridge");
    command.assert().code(2).stderr(contains("COMMAND"));
}

#[test]
fn unreachable_host_exits_without_a_response() {
    let port = TcpListener::bind(("127.0.0.1", 0))
        .and_then(|listener| listener.local_addr())
        .expect("reserve a port")
        .port();

    let mut command = cargo_bin_cmd!("tickbridge");
    command
        .env("TICKBRIDGE_HOST", "127.0.0.1")
        .args(["--port", &port.to_string(), "Ping", "--timeout", "0.5"]);
    command
        .assert()
        .code(2)
        .stdout("")
        .stderr(contains("failed to connect to bridge"));
}

#[test]
fn runs_with_built_in_defaults_only() {
    let home = TempDir::new().expect("create home dir");

    let mut command = cargo_bin_cmd!("tickbridge");
    command
        .env_clear()
        .env("HOME", home.path())
        .current_dir(home.path())
        .args(["Ping", "--timeout", "0.5"]);
    command
        .assert()
        .stderr(contains("failed to load configuration").not())
        .stderr(contains("tcp://127.0.0.1:9876").or(predicate::str::is_empty()));
}
