use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// TCP endpoint the bridge listens on.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TcpEndpoint {
    /// Host name or literal address.
    pub host: String,
    /// Port; `0` asks the operating system for an ephemeral port.
    pub port: u16,
}

impl TcpEndpoint {
    /// Builds an endpoint from its parts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Returns the `(host, port)` pair for socket address resolution.
    #[must_use]
    pub fn as_pair(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

impl fmt::Display for TcpEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "tcp://{}:{}", self.host, self.port)
    }
}

impl FromStr for TcpEndpoint {
    type Err = EndpointParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        if url.scheme() != "tcp" {
            return Err(EndpointParseError::UnsupportedScheme(
                url.scheme().to_owned(),
            ));
        }
        let host = url
            .host_str()
            .ok_or_else(|| EndpointParseError::MissingHost(input.to_owned()))?;
        let port = url
            .port()
            .ok_or_else(|| EndpointParseError::MissingPort(input.to_owned()))?;
        Ok(Self::new(host, port))
    }
}

/// Errors encountered while parsing a [`TcpEndpoint`] from text.
#[derive(Debug, Error)]
pub enum EndpointParseError {
    /// Scheme was not `tcp`.
    #[error("unsupported endpoint scheme '{0}'")]
    UnsupportedScheme(String),
    /// Host name was missing.
    #[error("missing TCP host in '{0}'")]
    MissingHost(String),
    /// Port was missing from the address.
    #[error("missing TCP port in '{0}'")]
    MissingPort(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}
