//! Shared configuration for the tickbridge host and command-line client.
//!
//! Values are layered by [`ortho_config`]: command-line flags override
//! `TICKBRIDGE_*` environment variables, which override a configuration file
//! discovered through `--config-path`, which in turn override the built-in
//! defaults exposed by the [`defaults`] helpers.

mod defaults;
mod endpoint;
mod logging;

pub use ortho_config::OrthoConfig;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_MAX_REQUEST_BYTES, DEFAULT_PORT,
    DEFAULT_READ_TIMEOUT_MS, DEFAULT_TICK_INTERVAL_MS, DEFAULT_WRITE_TIMEOUT_MS, default_host,
    default_log_filter, default_log_filter_string, default_log_format,
    default_max_request_bytes, default_port, default_read_timeout_ms, default_tick_interval_ms,
    default_write_timeout_ms,
};
pub use endpoint::{EndpointParseError, TcpEndpoint};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved configuration shared by the bridge host and its clients.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TICKBRIDGE")]
pub struct Config {
    /// Host name or address the listener binds to.
    #[ortho_config(default = defaults::default_host())]
    #[serde(default = "defaults::default_host")]
    pub host: String,
    /// TCP port the listener binds to.
    #[ortho_config(default = defaults::default_port())]
    #[serde(default = "defaults::default_port")]
    pub port: u16,
    /// Largest request body accepted on a single connection.
    #[ortho_config(default = defaults::default_max_request_bytes())]
    #[serde(default = "defaults::default_max_request_bytes")]
    pub max_request_bytes: usize,
    /// `tracing` filter expression applied to the subscriber.
    #[ortho_config(default = defaults::default_log_filter_string())]
    #[serde(default = "defaults::default_log_filter_string")]
    pub log_filter: String,
    /// Output format for structured logs.
    #[ortho_config(default = defaults::default_log_format())]
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
    /// Interval between ticks for the reference host loop.
    #[ortho_config(default = defaults::default_tick_interval_ms())]
    #[serde(default = "defaults::default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Time a connection may take to deliver its request; `0` waits forever.
    #[ortho_config(default = defaults::default_read_timeout_ms())]
    #[serde(default = "defaults::default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Time the host thread waits on a client that is not reading its
    /// response; `0` waits forever.
    #[ortho_config(default = defaults::default_write_timeout_ms())]
    #[serde(default = "defaults::default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_request_bytes: default_max_request_bytes(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            tick_interval_ms: default_tick_interval_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl Config {
    /// Endpoint the listener should bind and clients should connect to.
    #[must_use]
    pub fn endpoint(&self) -> TcpEndpoint {
        TcpEndpoint::new(self.host.clone(), self.port)
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Maximum accepted request size in bytes.
    #[must_use]
    pub const fn max_request_bytes(&self) -> usize {
        self.max_request_bytes
    }

    /// Tick interval for hosts that drive the pump from a fixed-rate loop.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Request read timeout, or `None` when disabled.
    #[must_use]
    pub const fn read_timeout(&self) -> Option<Duration> {
        optional_millis(self.read_timeout_ms)
    }

    /// Response write timeout, or `None` when disabled.
    #[must_use]
    pub const fn write_timeout(&self) -> Option<Duration> {
        optional_millis(self.write_timeout_ms)
    }
}

const fn optional_millis(millis: u64) -> Option<Duration> {
    if millis == 0 {
        None
    } else {
        Some(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_loopback() {
        let config = Config::default();
        assert_eq!(config.endpoint(), TcpEndpoint::new("127.0.0.1", 9876));
        assert_eq!(config.log_filter(), "info");
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.max_request_bytes(), DEFAULT_MAX_REQUEST_BYTES);
    }

    #[test]
    fn tick_interval_uses_milliseconds() {
        let config = Config {
            tick_interval_ms: 40,
            ..Config::default()
        };
        assert_eq!(config.tick_interval(), Duration::from_millis(40));
    }

    #[test]
    fn zero_timeouts_are_disabled() {
        let config = Config {
            read_timeout_ms: 0,
            write_timeout_ms: 250,
            ..Config::default()
        };
        assert_eq!(config.read_timeout(), None);
        assert_eq!(config.write_timeout(), Some(Duration::from_millis(250)));
    }
}
