//! Blocking client for talking to a running bridge.
//!
//! Each call opens a fresh connection, writes one request envelope, half-closes
//! the write side and reads until the bridge closes the connection. The bridge
//! only answers on its next tick, so a call blocks for at least one host frame.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use tickbridge_config::TcpEndpoint;

use crate::envelope::{CommandEnvelope, ResponseEnvelope};

/// Default timeout for connecting, writing and waiting for the response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised while exchanging a request with the bridge.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The endpoint's host name did not resolve.
    #[error("failed to resolve bridge address {endpoint}: {source}")]
    Resolve {
        /// Endpoint as configured.
        endpoint: String,
        /// Resolver error.
        #[source]
        source: io::Error,
    },
    /// No connection could be established.
    #[error("failed to connect to bridge at {endpoint}: {source}")]
    Connect {
        /// Endpoint as configured.
        endpoint: String,
        /// Error from the last address tried.
        #[source]
        source: io::Error,
    },
    /// Writing the request failed.
    #[error("failed to send request to bridge: {0}")]
    SendRequest(#[source] io::Error),
    /// Reading the response failed or timed out.
    #[error("failed to read response from bridge: {0}")]
    ReadResponse(#[source] io::Error),
    /// The bridge closed the connection without answering.
    #[error("bridge closed the connection without a response")]
    EmptyResponse,
    /// The bridge answered with something that is not a response envelope.
    #[error("failed to parse bridge response: {0}")]
    ParseResponse(#[source] serde_json::Error),
}

impl ClientError {
    /// Returns true when the error suggests nothing is listening.
    #[must_use]
    pub fn is_bridge_unavailable(&self) -> bool {
        match self {
            Self::Connect { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::AddrNotAvailable
                    | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Sends requests to one bridge endpoint.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    endpoint: TcpEndpoint,
    timeout: Duration,
}

impl BridgeClient {
    /// Creates a client for `endpoint` using [`DEFAULT_TIMEOUT`].
    #[must_use]
    pub const fn new(endpoint: TcpEndpoint) -> Self {
        Self {
            endpoint,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Creates a client for an already-resolved address.
    #[must_use]
    pub fn for_addr(addr: SocketAddr) -> Self {
        Self::new(TcpEndpoint::new(addr.ip().to_string(), addr.port()))
    }

    /// Overrides the connect and I/O timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Endpoint this client talks to.
    #[must_use]
    pub const fn endpoint(&self) -> &TcpEndpoint {
        &self.endpoint
    }

    /// Sends `identifier` with `parameters` and waits for the response.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the exchange fails. An error envelope from
    /// the bridge is a successful exchange and is returned as `Ok`.
    pub fn send(
        &self,
        identifier: &str,
        parameters: Value,
    ) -> Result<ResponseEnvelope, ClientError> {
        self.send_raw(&CommandEnvelope::new(identifier, parameters).encode())
    }

    /// Sends an arbitrary request body and decodes the response.
    ///
    /// # Errors
    ///
    /// See [`BridgeClient::send`].
    pub fn send_raw(&self, body: &[u8]) -> Result<ResponseEnvelope, ClientError> {
        let response = self.exchange(body)?;
        if response.iter().all(u8::is_ascii_whitespace) {
            return Err(ClientError::EmptyResponse);
        }
        ResponseEnvelope::decode(&response).map_err(ClientError::ParseResponse)
    }

    /// Writes `body`, half-closes and returns everything the bridge sent back.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] for resolution, connection and I/O failures.
    pub fn exchange(&self, body: &[u8]) -> Result<Vec<u8>, ClientError> {
        let mut stream = self.connect()?;
        stream
            .write_all(body)
            .and_then(|()| stream.flush())
            .map_err(ClientError::SendRequest)?;
        if let Err(error) = stream.shutdown(Shutdown::Write)
            && error.kind() != io::ErrorKind::NotConnected
        {
            return Err(ClientError::SendRequest(error));
        }

        let mut response = Vec::new();
        stream
            .read_to_end(&mut response)
            .map_err(ClientError::ReadResponse)?;
        Ok(response)
    }

    fn connect(&self) -> Result<TcpStream, ClientError> {
        let display = self.endpoint.to_string();
        let addrs = self
            .endpoint
            .as_pair()
            .to_socket_addrs()
            .map_err(|source| ClientError::Resolve {
                endpoint: display.clone(),
                source,
            })?;

        let mut last_error =
            io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved addresses");
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    return self.configure(stream).map_err(|source| ClientError::Connect {
                        endpoint: display,
                        source,
                    });
                }
                Err(error) => last_error = error,
            }
        }
        Err(ClientError::Connect {
            endpoint: display,
            source: last_error,
        })
    }

    fn configure(&self, stream: TcpStream) -> io::Result<TcpStream> {
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}
