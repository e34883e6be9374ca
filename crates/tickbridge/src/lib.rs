//! Command bridge between out-of-process automation clients and a
//! single-threaded host application.
//!
//! A [`Bridge`] listens on a loopback TCP endpoint. Every connection carries
//! exactly one JSON request naming a command as `subsystem.action` (or a bare
//! `action` for the `core` subsystem). Connection threads only decode and
//! queue requests; the host calls [`Bridge::on_tick`] once per frame and all
//! handlers run there, on the host thread, in arrival order. Each request
//! receives exactly one JSON response before its connection is closed.
//!
//! Commands are contributed by subsystems implementing [`Lifecycle`] and,
//! optionally, [`CommandProvider`]. The built-in [`CoreSubsystem`] answers
//! liveness, introspection and batch requests.
//!
//! Configuration is loaded through [`tickbridge_config`]; lifecycle events are
//! reported through [`BridgeReporter`] and structured `tracing` output.

mod bootstrap;
mod bridge;
pub mod builtin;
pub mod client;
pub mod envelope;
pub mod executor;
mod host;
pub mod queue;
pub mod registry;
mod reporter;
pub mod subsystem;
pub mod telemetry;
pub mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use bridge::{Bridge, SHUTDOWN_MESSAGE};
pub use builtin::CoreSubsystem;
pub use client::{BridgeClient, ClientError};
pub use envelope::{CommandEnvelope, DecodeError, ResponseEnvelope};
pub use executor::{CommandContext, TickReport};
pub use host::{HostError, HostSummary, run_until};
pub use registry::{Handler, HandlerFault, HandlerResult, handler, simple_handler};
pub use reporter::{BridgeReporter, StructuredBridgeReporter};
pub use subsystem::{BridgeContext, CommandProvider, HandlerTable, Lifecycle, SubsystemError};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
