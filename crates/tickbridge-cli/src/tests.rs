//! End-to-end tests running the CLI against an in-process bridge.
#![expect(clippy::expect_used, reason = "tests fail loudly on setup errors")]

use std::cell::RefCell;
use std::ffi::OsString;
use std::net::{SocketAddr, TcpListener};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use tickbridge::{Bridge, HandlerFault, simple_handler};
use tickbridge_config::Config;

use super::*;

const PUMP_INTERVAL: Duration = Duration::from_millis(5);

/// Returns a fixed configuration and records the arguments it was given.
struct StaticLoader {
    config: Config,
    seen: RefCell<Vec<OsString>>,
}

impl StaticLoader {
    fn for_addr(addr: SocketAddr) -> Self {
        Self {
            config: Config {
                host: addr.ip().to_string(),
                port: addr.port(),
                ..Config::default()
            },
            seen: RefCell::new(Vec::new()),
        }
    }
}

impl ConfigLoader for StaticLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        self.seen.borrow_mut().extend(args.iter().cloned());
        Ok(self.config.clone())
    }
}

struct Outcome {
    code: ExitCode,
    stdout: String,
    stderr: String,
}

impl Outcome {
    fn response(&self) -> Value {
        serde_json::from_str(&self.stdout).expect("stdout should hold a JSON response")
    }
}

fn os_args(args: &[&str]) -> Vec<OsString> {
    std::iter::once("tickbridge")
        .chain(args.iter().copied())
        .map(OsString::from)
        .collect()
}

fn invoke(args: &[&str], loader: &StaticLoader) -> Outcome {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let code = run_with_loader(os_args(args), &mut stdout, &mut stderr, loader);
    Outcome {
        code,
        stdout: String::from_utf8(stdout).expect("utf8 stdout"),
        stderr: String::from_utf8(stderr).expect("utf8 stderr"),
    }
}

/// Runs the CLI on a worker thread while this thread pumps bridge ticks.
fn invoke_against(bridge: &mut Bridge, args: &[&str]) -> Outcome {
    let addr = bridge.local_addr().expect("bridge should be running");
    let args: Vec<String> = args.iter().map(ToString::to_string).collect();
    let worker = thread::spawn(move || {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        invoke(&args, &StaticLoader::for_addr(addr))
    });
    while !worker.is_finished() {
        bridge.on_tick();
        thread::sleep(PUMP_INTERVAL);
    }
    worker.join().expect("join CLI thread")
}

#[fixture]
fn bridge() -> Bridge {
    let mut bridge = Bridge::new(Config {
        port: 0,
        ..Config::default()
    });
    bridge.register_handler("scene", "Echo", simple_handler(Ok));
    bridge.register_handler(
        "scene",
        "Explode",
        simple_handler(|_| Err(HandlerFault::new("kaboom"))),
    );
    bridge.start().expect("start bridge");
    bridge
}

fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind listener");
    listener.local_addr().expect("listener address")
}

#[rstest]
fn prints_the_success_envelope(mut bridge: Bridge) {
    let outcome = invoke_against(
        &mut bridge,
        &["scene.Echo", "--params", r#"{"name":"Cube"}"#, "--param", "size=2"],
    );

    assert_eq!(outcome.code, ExitCode::SUCCESS, "stderr: {}", outcome.stderr);
    assert_eq!(
        outcome.response(),
        json!({"status": "success", "result": {"name": "Cube", "size": 2}})
    );
    assert!(outcome.stderr.is_empty());
}

#[rstest]
fn error_envelopes_exit_with_failure(mut bridge: Bridge) {
    let outcome = invoke_against(&mut bridge, &["scene.Explode"]);

    assert_eq!(outcome.code, ExitCode::FAILURE);
    assert_eq!(
        outcome.response(),
        json!({"status": "error", "message": "Error executing scene.Explode: kaboom"})
    );
}

#[rstest]
fn pretty_output_spans_several_lines(mut bridge: Bridge) {
    let outcome = invoke_against(&mut bridge, &["scene.Echo", "--pretty"]);

    assert_eq!(outcome.code, ExitCode::SUCCESS);
    assert!(outcome.stdout.lines().count() > 1);
    assert_eq!(outcome.response()["status"], "success");
}

#[test]
fn unreachable_bridges_report_on_stderr() {
    let loader = StaticLoader::for_addr(unused_addr());

    let outcome = invoke(&["Ping", "--timeout", "0.5"], &loader);

    assert_eq!(outcome.code, ExitCode::from(EXIT_NO_RESPONSE));
    assert!(outcome.stdout.is_empty());
    assert!(
        outcome.stderr.contains("failed to connect to bridge"),
        "stderr: {}",
        outcome.stderr
    );
}

#[rstest]
#[case::bad_params(&["Ping", "--params", "[1]"], "--params must be a JSON object")]
#[case::bad_param(&["Ping", "--param", "name"], "--param expects KEY=VALUE")]
#[case::zero_timeout(&["Ping", "--timeout", "0"], "--timeout must be a positive number")]
fn invalid_input_is_reported_before_connecting(#[case] args: &[&str], #[case] expected: &str) {
    let loader = StaticLoader::for_addr(unused_addr());

    let outcome = invoke(args, &loader);

    assert_eq!(outcome.code, ExitCode::from(EXIT_NO_RESPONSE));
    assert!(outcome.stderr.contains(expected), "stderr: {}", outcome.stderr);
}

#[test]
fn missing_command_is_a_usage_error() {
    let loader = StaticLoader::for_addr(unused_addr());

    let outcome = invoke(&[], &loader);

    assert_eq!(outcome.code, ExitCode::from(EXIT_NO_RESPONSE));
    assert!(outcome.stderr.contains("COMMAND"), "stderr: {}", outcome.stderr);
    assert!(loader.seen.borrow().is_empty());
}

#[test]
fn help_goes_to_stdout() {
    let loader = StaticLoader::for_addr(unused_addr());

    let outcome = invoke(&["--help"], &loader);

    assert_eq!(outcome.code, ExitCode::SUCCESS);
    assert!(outcome.stdout.contains("Usage"));
}

#[test]
fn leading_configuration_flags_reach_the_loader() {
    let loader = StaticLoader::for_addr(unused_addr());

    let _ = invoke(&["--port", "1", "Ping", "--timeout", "0.2"], &loader);

    assert_eq!(*loader.seen.borrow(), os_args(&["--port", "1"]));
}
