//! Explicit context handed to subsystems during initialisation.

use std::net::SocketAddr;

use tickbridge_config::TcpEndpoint;

/// Snapshot of the bridge a subsystem is being attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeContext {
    bridge_version: String,
    endpoint: TcpEndpoint,
    local_addr: Option<SocketAddr>,
    max_request_bytes: usize,
}

impl BridgeContext {
    /// Creates a context for a bridge configured with `endpoint`.
    #[must_use]
    pub fn new(endpoint: TcpEndpoint, max_request_bytes: usize) -> Self {
        Self {
            bridge_version: env!("CARGO_PKG_VERSION").to_owned(),
            endpoint,
            local_addr: None,
            max_request_bytes,
        }
    }

    /// Records the address the listener actually bound.
    #[must_use]
    pub fn with_local_addr(mut self, local_addr: Option<SocketAddr>) -> Self {
        self.local_addr = local_addr;
        self
    }

    /// Version of the bridge library.
    #[must_use]
    pub fn bridge_version(&self) -> &str {
        &self.bridge_version
    }

    /// Configured listener endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &TcpEndpoint {
        &self.endpoint
    }

    /// Bound address, when the listener is running.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Largest request body accepted by the listener.
    #[must_use]
    pub const fn max_request_bytes(&self) -> usize {
        self.max_request_bytes
    }
}
