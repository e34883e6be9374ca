//! Error types for listener operations.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors surfaced while binding or running the listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Host name resolution failed.
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
        /// Resolver error.
        #[source]
        source: io::Error,
    },
    /// Resolution succeeded but produced no usable address.
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
    },
    /// Binding the listening socket failed.
    #[error("failed to bind TCP listener at {addr}: {source}")]
    BindTcp {
        /// Address that could not be bound.
        addr: SocketAddr,
        /// Operating system error.
        #[source]
        source: io::Error,
    },
    /// The bound socket could not report its address.
    #[error("failed to read listener address: {source}")]
    LocalAddr {
        /// Operating system error.
        #[source]
        source: io::Error,
    },
    /// Switching the listener to non-blocking mode failed.
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        /// Operating system error.
        #[source]
        source: io::Error,
    },
    /// The accept thread could not be spawned.
    #[error("failed to spawn accept thread: {source}")]
    Spawn {
        /// Operating system error.
        #[source]
        source: io::Error,
    },
    /// The accept thread panicked.
    #[error("listener thread panicked")]
    ThreadPanic,
}
