//! Host-facing orchestrator tying the bridge components together.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::warn;

use tickbridge_config::Config;

use crate::envelope::{CommandEnvelope, ResponseEnvelope};
use crate::executor::{CommandExecutor, CommandJournal, CommandMetrics, TickReport};
use crate::queue::DispatchQueue;
use crate::registry::{Handler, HandlerRegistry};
use crate::reporter::{BridgeReporter, StructuredBridgeReporter};
use crate::subsystem::{
    BridgeContext, LIFECYCLE_TARGET, Lifecycle, SubsystemError, SubsystemManager,
};
use crate::transport::{ConnectionAcceptor, ListenerError, QueueingHandler};

/// Message written to requests still queued when the bridge stops.
pub const SHUTDOWN_MESSAGE: &str = "Bridge is shutting down";

/// A command bridge embedded in a host application.
///
/// The host drives it through a handful of hooks: [`Bridge::start`] and
/// [`Bridge::stop`] control the listener, [`Bridge::on_tick`] must be called
/// once per host frame on the host thread, and
/// [`Bridge::register_subsystem`] / [`Bridge::shutdown_all`] manage the
/// subsystems that provide commands.
pub struct Bridge {
    config: Config,
    queue: Arc<DispatchQueue>,
    executor: CommandExecutor,
    subsystems: SubsystemManager,
    acceptor: ConnectionAcceptor,
    reporter: Arc<dyn BridgeReporter>,
}

impl Bridge {
    /// Creates a stopped bridge that reports through `tracing`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_reporter(config, Arc::new(StructuredBridgeReporter::new()))
    }

    /// Creates a stopped bridge with a custom lifecycle reporter.
    #[must_use]
    pub fn with_reporter(config: Config, reporter: Arc<dyn BridgeReporter>) -> Self {
        let queue = Arc::new(DispatchQueue::new());
        let handler = QueueingHandler::new(Arc::clone(&queue), config.max_request_bytes())
            .with_timeouts(config.read_timeout(), config.write_timeout());
        Self {
            acceptor: ConnectionAcceptor::new(Arc::new(handler)),
            executor: CommandExecutor::new(Arc::clone(&queue)),
            subsystems: SubsystemManager::new(),
            queue,
            config,
            reporter,
        }
    }

    /// Starts accepting connections. Does nothing if already running.
    ///
    /// # Errors
    ///
    /// Returns the [`ListenerError`] raised while binding the endpoint.
    pub fn start(&mut self) -> Result<SocketAddr, ListenerError> {
        if let Some(addr) = self.acceptor.local_addr() {
            return Ok(addr);
        }
        match self.acceptor.start(&self.config.endpoint()) {
            Ok(addr) => {
                self.reporter.listener_started(addr);
                Ok(addr)
            }
            Err(error) => {
                self.reporter.listener_failed(&error);
                Err(error)
            }
        }
    }

    /// Stops the listener and answers every queued request with
    /// [`SHUTDOWN_MESSAGE`]. Returns how many queued requests were discarded.
    ///
    /// Subsystems stay registered; call [`Bridge::shutdown_all`] to tear them
    /// down.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] if the accept thread panicked.
    /// Queued requests are discarded either way.
    pub fn stop(&mut self) -> Result<usize, ListenerError> {
        let was_running = self.acceptor.is_running();
        let stopped = self.acceptor.stop();
        let discarded = self.executor.discard_pending(SHUTDOWN_MESSAGE);
        if was_running {
            self.reporter.listener_stopped(discarded);
        }
        stopped.map(|()| discarded)
    }

    /// Processes every request queued since the previous tick.
    ///
    /// Once the listener has stopped, requests that still reach the queue
    /// are answered with [`SHUTDOWN_MESSAGE`] instead of being executed.
    pub fn on_tick(&mut self) -> TickReport {
        if self.acceptor.is_running() {
            self.executor.on_tick()
        } else {
            self.executor.on_tick_refusing(SHUTDOWN_MESSAGE)
        }
    }

    /// Executes one command synchronously on the calling thread.
    pub fn execute(&mut self, envelope: CommandEnvelope) -> ResponseEnvelope {
        self.executor.execute(envelope)
    }

    /// Initialises a subsystem and registers its handlers. Returns the number
    /// of handlers registered.
    ///
    /// # Errors
    ///
    /// Returns [`SubsystemError`] when the subsystem is rejected or fails to
    /// initialise; nothing is registered in that case.
    pub fn register_subsystem(
        &mut self,
        subsystem: Box<dyn Lifecycle>,
    ) -> Result<usize, SubsystemError> {
        let name = subsystem.name().to_owned();
        let version = subsystem.version().to_owned();
        let context = self.context();
        match self
            .subsystems
            .register(subsystem, self.executor.registry_mut(), &context)
        {
            Ok(handlers) => {
                self.reporter
                    .subsystem_registered(&name, &version, handlers);
                Ok(handlers)
            }
            Err(error) => {
                self.reporter.subsystem_failed(&error);
                Err(error)
            }
        }
    }

    /// Registers a single handler outside any subsystem lifecycle, returning
    /// the handler it replaced.
    pub fn register_handler(
        &mut self,
        subsystem: &str,
        action: &str,
        handler: Handler,
    ) -> Option<Handler> {
        self.executor
            .registry_mut()
            .register(subsystem, action, handler)
    }

    /// Shuts down every subsystem in reverse registration order. Returns how
    /// many were shut down.
    pub fn shutdown_all(&mut self) -> usize {
        self.subsystems.shutdown_all(self.executor.registry_mut())
    }

    /// Resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Handler registry.
    #[must_use]
    pub const fn registry(&self) -> &HandlerRegistry {
        self.executor.registry()
    }

    /// Execution metrics.
    #[must_use]
    pub const fn metrics(&self) -> &CommandMetrics {
        self.executor.metrics()
    }

    /// Failure history and deferred operations.
    #[must_use]
    pub const fn journal(&self) -> &CommandJournal {
        self.executor.journal()
    }

    /// Registered subsystems.
    #[must_use]
    pub const fn subsystems(&self) -> &SubsystemManager {
        &self.subsystems
    }

    /// Address bound by the listener while running.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.acceptor.local_addr()
    }

    /// Returns true while the listener is accepting connections.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.acceptor.is_running()
    }

    /// Requests waiting for the next tick.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn context(&self) -> BridgeContext {
        BridgeContext::new(self.config.endpoint(), self.config.max_request_bytes())
            .with_local_addr(self.acceptor.local_addr())
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Bridge")
            .field("endpoint", &self.config.endpoint())
            .field("local_addr", &self.local_addr())
            .field("subsystems", &self.subsystems)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if !self.acceptor.is_running() && self.queue.is_empty() {
            return;
        }
        if let Err(error) = self.stop() {
            warn!(
                target: LIFECYCLE_TARGET,
                %error,
                "bridge shutdown failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::expect_used, reason = "tests fail loudly on setup errors")]

    use serde_json::json;

    use super::*;
    use crate::queue::PendingRequest;
    use crate::registry::simple_handler;
    use crate::tests::support::{RecordingStream, ResponseCapture};

    fn echo_bridge() -> Bridge {
        let mut bridge = Bridge::new(Config {
            port: 0,
            ..Config::default()
        });
        bridge.register_handler("scene", "Echo", simple_handler(Ok));
        bridge
    }

    fn enqueue_echo(bridge: &Bridge) -> ResponseCapture {
        let (stream, capture) = RecordingStream::new();
        bridge.queue.enqueue(PendingRequest::new(
            1,
            CommandEnvelope::new("scene.Echo", json!({"late": true})),
            Box::new(stream),
        ));
        capture
    }

    #[test]
    fn requests_reaching_a_stopped_bridge_are_refused() {
        let mut bridge = echo_bridge();
        bridge.start().expect("start bridge");
        bridge.stop().expect("stop bridge");
        let capture = enqueue_echo(&bridge);

        let report = bridge.on_tick();

        assert_eq!(report.discarded, 1);
        assert_eq!(report.processed, 0);
        assert_eq!(capture.response(), ResponseEnvelope::error(SHUTDOWN_MESSAGE));
        assert!(capture.is_closed());
        assert!(bridge.metrics().get("scene.Echo").is_none());
    }

    #[test]
    fn running_bridges_execute_queued_requests() {
        let mut bridge = echo_bridge();
        bridge.start().expect("start bridge");
        let capture = enqueue_echo(&bridge);

        let report = bridge.on_tick();

        assert_eq!(report.processed, 1);
        assert_eq!(report.discarded, 0);
        assert_eq!(
            capture.response(),
            ResponseEnvelope::success(json!({"late": true}))
        );
    }
}
