//! Process-wide tracing subscriber for bridge hosts.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use tickbridge_config::{Config, LogFormat};

static INSTALLED: OnceCell<LogFormat> = OnceCell::new();

/// Proof that a global subscriber is in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Format chosen by the call that installed the subscriber.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter '{filter}': {message}")]
    Filter {
        /// Filter expression as configured.
        filter: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Another subscriber was already installed outside this module.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global subscriber on first use.
///
/// Later calls leave the installed subscriber alone and return a handle
/// describing it, so hosts and tests can call this freely.
///
/// # Errors
///
/// Returns [`TelemetryError`] when the filter does not parse or when a
/// subscriber was installed by someone else.
///
/// # Examples
///
/// ```rust
/// use tickbridge::telemetry;
/// use tickbridge_config::Config;
///
/// # fn main() -> Result<(), telemetry::TelemetryError> {
/// let config = Config::default();
/// let first = telemetry::initialise(&config)?;
/// let again = telemetry::initialise(&config)?;
/// assert_eq!(first, again);
/// # Ok(())
/// # }
/// ```
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED
        .get_or_try_init(|| install(config.log_filter(), config.log_format()))
        .map(|format| TelemetryHandle { format: *format })
}

/// Parses a filter expression such as `info,tickbridge::dispatch=debug`.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] when the expression is invalid.
pub fn parse_filter(filter: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(filter).map_err(|error| TelemetryError::Filter {
        filter: filter.to_owned(),
        message: error.to_string(),
    })
}

fn install(filter: &str, format: LogFormat) -> Result<LogFormat, TelemetryError> {
    let filter = parse_filter(filter)?;
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    };
    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;
    Ok(format)
}
