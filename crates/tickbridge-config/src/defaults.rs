use crate::logging::LogFormat;

/// Default host for the bridge listener. The transport is trusted loopback.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default TCP port for the bridge listener.
pub const DEFAULT_PORT: u16 = 9876;

/// Default ceiling for a single request body.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default interval between host ticks (roughly 60 per second).
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 16;

/// Default time a connection may take to deliver its request.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;

/// Default time the host thread waits on a client that stopped reading.
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 500;

/// Owned default host, for serde.
#[must_use]
pub fn default_host() -> String {
    DEFAULT_HOST.to_owned()
}

/// Default listener port.
#[must_use]
pub const fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Default request size ceiling.
#[must_use]
pub const fn default_max_request_bytes() -> usize {
    DEFAULT_MAX_REQUEST_BYTES
}

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default tick interval in milliseconds.
#[must_use]
pub const fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

/// Default request read timeout in milliseconds.
#[must_use]
pub const fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

/// Default response write timeout in milliseconds.
#[must_use]
pub const fn default_write_timeout_ms() -> u64 {
    DEFAULT_WRITE_TIMEOUT_MS
}
