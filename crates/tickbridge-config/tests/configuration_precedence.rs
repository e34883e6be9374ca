//! Layering tests for the shared configuration: defaults, file,
//! environment and command line.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use tickbridge_config::{Config, LogFormat, OrthoConfig, TcpEndpoint, default_log_filter};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
    guard: Option<MutexGuard<'static, ()>>,
}

impl EnvOverride {
    fn set_var(key: &'static str, value: &OsStr) -> Self {
        let guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let previous = std::env::var_os(key);
        // Environment mutation is `unsafe` on newer toolchains; the override is
        // restored in `Drop` while the mutex is still held.
        unsafe { std::env::set_var(key, value) };
        Self {
            key,
            previous,
            guard: Some(guard),
        }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
        drop(self.guard.take());
    }
}

struct Harness {
    temp_dir: TempDir,
    args: Vec<OsString>,
}

impl Harness {
    fn write_config(&mut self, toml: &str) {
        let path = self.temp_dir.path().join("tickbridge.toml");
        fs::write(&path, toml).expect("write configuration");
        self.args.push(OsString::from("--config-path"));
        self.args.push(path.into_os_string());
    }

    fn push_arg(&mut self, arg: &str) {
        self.args.push(OsString::from(arg));
    }

    fn load(&self) -> Config {
        Config::load_from_iter(self.args.clone()).expect("configuration loads")
    }
}

#[fixture]
fn harness() -> Harness {
    Harness {
        temp_dir: TempDir::new().expect("create temp dir"),
        args: vec![OsString::from("tickbridge-host")],
    }
}

#[rstest]
fn built_in_defaults_apply(harness: Harness) {
    let _lock = ENV_MUTEX
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let config = harness.load();
    assert_eq!(config.endpoint(), TcpEndpoint::new("127.0.0.1", 9876));
    assert_eq!(config.log_filter(), default_log_filter());
    assert_eq!(config.log_format(), LogFormat::Json);
    assert_eq!(config, Config::default());
}

#[rstest]
fn configuration_file_overrides_defaults(mut harness: Harness) {
    let _lock = ENV_MUTEX
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    harness.write_config("port = 9100\nlog_format = \"compact\"\n");
    let config = harness.load();
    assert_eq!(config.port, 9100);
    assert_eq!(config.log_format(), LogFormat::Compact);
    assert_eq!(config.host, "127.0.0.1");
}

#[rstest]
fn command_line_overrides_configuration_file(mut harness: Harness) {
    let _lock = ENV_MUTEX
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    harness.write_config("port = 9100\n");
    harness.push_arg("--port");
    harness.push_arg("9200");
    let config = harness.load();
    assert_eq!(config.port, 9200);
}

#[rstest]
fn environment_overrides_configuration_file(mut harness: Harness) {
    harness.write_config("port = 9100\n");
    let _env = EnvOverride::set_var("TICKBRIDGE_PORT", OsStr::new("9300"));
    let config = harness.load();
    assert_eq!(config.port, 9300);
}
