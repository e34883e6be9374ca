//! TCP listener feeding the dispatch queue.
//!
//! The acceptor binds the configured endpoint and accepts connections on a
//! background thread. Each accepted connection gets its own thread, which
//! reads one request, decodes it and either enqueues it for the next tick or
//! answers a decode failure immediately.

mod connection;
mod errors;
mod listener;
#[cfg(test)]
mod test_utils;

pub use self::connection::{ConnectionHandler, ConnectionStream, QueueingHandler, ResponseStream};
pub use self::errors::ListenerError;
pub use self::listener::ConnectionAcceptor;
#[cfg(test)]
pub(crate) use self::test_utils::{CountingHandler, DrainingHandler, ParkingHandler};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
