//! Structured reporting for bridge lifecycle events.

use std::net::SocketAddr;
use std::sync::Arc;

use tickbridge_config::Config;

use crate::bootstrap::BootstrapError;
use crate::subsystem::{LIFECYCLE_TARGET, SubsystemError};
use crate::transport::ListenerError;

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait BridgeReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the listener is accepting connections.
    fn listener_started(&self, addr: SocketAddr);

    /// Invoked when the listener could not be started.
    fn listener_failed(&self, error: &ListenerError);

    /// Invoked after the listener stopped and queued requests were discarded.
    fn listener_stopped(&self, discarded: usize);

    /// Invoked after a subsystem was initialised and its handlers registered.
    fn subsystem_registered(&self, name: &str, version: &str, handlers: usize);

    /// Invoked when a subsystem was rejected or failed to initialise.
    fn subsystem_failed(&self, error: &SubsystemError);
}

impl<T> BridgeReporter for Arc<T>
where
    T: BridgeReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn listener_started(&self, addr: SocketAddr) {
        (**self).listener_started(addr);
    }

    fn listener_failed(&self, error: &ListenerError) {
        (**self).listener_failed(error);
    }

    fn listener_stopped(&self, discarded: usize) {
        (**self).listener_stopped(discarded);
    }

    fn subsystem_registered(&self, name: &str, version: &str, handlers: usize) {
        (**self).subsystem_registered(name, version, handlers);
    }

    fn subsystem_failed(&self, error: &SubsystemError) {
        (**self).subsystem_failed(error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredBridgeReporter;

impl StructuredBridgeReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl BridgeReporter for StructuredBridgeReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "bootstrap_starting",
            "starting bridge bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "bootstrap_succeeded",
            endpoint = %config.endpoint(),
            max_request_bytes = config.max_request_bytes(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "bridge bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: LIFECYCLE_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "bridge bootstrap failed"
        );
    }

    fn listener_started(&self, addr: SocketAddr) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "listener_started",
            addr = %addr,
            "bridge accepting connections"
        );
    }

    fn listener_failed(&self, error: &ListenerError) {
        tracing::error!(
            target: LIFECYCLE_TARGET,
            event = "listener_failed",
            error = %error,
            "bridge listener failed to start"
        );
    }

    fn listener_stopped(&self, discarded: usize) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "listener_stopped",
            discarded,
            "bridge stopped"
        );
    }

    fn subsystem_registered(&self, name: &str, version: &str, handlers: usize) {
        tracing::info!(
            target: LIFECYCLE_TARGET,
            event = "subsystem_registered",
            subsystem = name,
            version,
            handlers,
            "subsystem ready"
        );
    }

    fn subsystem_failed(&self, error: &SubsystemError) {
        tracing::warn!(
            target: LIFECYCLE_TARGET,
            event = "subsystem_failed",
            error = %error,
            "subsystem rejected"
        );
    }
}
