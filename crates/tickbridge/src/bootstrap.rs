//! Bridge bootstrap orchestration.

use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use tickbridge_config::{Config, OrthoConfig};

use crate::bridge::Bridge;
use crate::reporter::BridgeReporter;
use crate::telemetry::{self, TelemetryError};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the bridge configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a configuration resolved elsewhere, typically by a host
/// that embeds the bridge.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already-resolved configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
}

/// Loads configuration, installs telemetry and builds a stopped [`Bridge`].
///
/// The caller registers subsystems and then calls [`Bridge::start`].
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration or telemetry fail; the
/// reporter is told about the failure before it is returned.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn BridgeReporter>,
) -> Result<Bridge, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    if let Err(source) = telemetry::initialise(&config) {
        let error = BootstrapError::Telemetry { source };
        reporter.bootstrap_failed(&error);
        return Err(error);
    }

    reporter.bootstrap_succeeded(&config);
    Ok(Bridge::with_reporter(config, reporter))
}
