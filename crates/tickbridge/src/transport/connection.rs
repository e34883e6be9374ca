//! Connection handling for accepted sockets.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use crate::envelope::{CommandEnvelope, DecodeError, ResponseEnvelope};
use crate::queue::{DispatchQueue, PendingRequest};

use tickbridge_config::{DEFAULT_READ_TIMEOUT_MS, DEFAULT_WRITE_TIMEOUT_MS};

use super::LISTENER_TARGET;
use super::listener::ActiveGuard;

/// Writable end of a client connection that receives exactly one response.
pub trait ResponseStream: Write + Send {
    /// Closes the connection in both directions. Errors are ignored: the peer
    /// may already be gone.
    fn close(&mut self);
}

/// Blocking TCP stream for one accepted client.
#[derive(Debug)]
pub struct ConnectionStream {
    stream: TcpStream,
    peer: Option<SocketAddr>,
    tracking: Option<ActiveGuard>,
}

impl ConnectionStream {
    /// Wraps an accepted stream.
    #[must_use]
    pub fn new(stream: TcpStream) -> Self {
        let peer = stream.peer_addr().ok();
        Self {
            stream,
            peer,
            tracking: None,
        }
    }

    /// Address of the remote client, when known.
    #[must_use]
    pub const fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Bounds how long a read or a write may block. `None` blocks forever.
    ///
    /// # Errors
    ///
    /// Returns the operating system error when a timeout cannot be applied.
    pub fn set_timeouts(&self, read: Option<Duration>, write: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(read)?;
        self.stream.set_write_timeout(write)
    }

    /// Clones the underlying socket so it can be shut down from another
    /// thread.
    pub(crate) fn try_clone_socket(&self) -> io::Result<TcpStream> {
        self.stream.try_clone()
    }

    /// Ties the stream to the acceptor's in-flight set until released.
    pub(super) fn attach_tracking(&mut self, guard: ActiveGuard) {
        self.tracking = Some(guard);
    }

    /// Leaves the in-flight set. A stopping acceptor no longer shuts this
    /// socket down; whoever owns the stream now answers it.
    pub(crate) fn release_tracking(&mut self) {
        self.tracking = None;
    }
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for ConnectionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl ResponseStream for ConnectionStream {
    fn close(&mut self) {
        if let Err(error) = self.stream.shutdown(Shutdown::Both)
            && error.kind() != io::ErrorKind::NotConnected
        {
            debug!(target: LISTENER_TARGET, %error, "connection shutdown failed");
        }
    }
}

/// Handles accepted connections.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection on its own thread. Implementations should
    /// avoid panicking.
    fn handle(&self, stream: ConnectionStream);
}

/// Reads one request per connection and queues it for the next tick.
#[derive(Debug)]
pub struct QueueingHandler {
    queue: Arc<DispatchQueue>,
    max_request_bytes: usize,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    next_id: AtomicU64,
}

impl QueueingHandler {
    /// Creates a handler feeding `queue`, rejecting bodies larger than
    /// `max_request_bytes`. Socket timeouts start at the configuration
    /// defaults.
    #[must_use]
    pub const fn new(queue: Arc<DispatchQueue>, max_request_bytes: usize) -> Self {
        Self {
            queue,
            max_request_bytes,
            read_timeout: Some(Duration::from_millis(DEFAULT_READ_TIMEOUT_MS)),
            write_timeout: Some(Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Overrides the socket timeouts applied to every accepted connection.
    ///
    /// The write timeout bounds how long the host thread can be held by a
    /// client that stops reading its response.
    #[must_use]
    pub const fn with_timeouts(mut self, read: Option<Duration>, write: Option<Duration>) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }
}

impl ConnectionHandler for QueueingHandler {
    fn handle(&self, mut stream: ConnectionStream) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Err(error) = stream.set_timeouts(self.read_timeout, self.write_timeout) {
            warn!(
                target: LISTENER_TARGET,
                request = id,
                %error,
                "failed to apply socket timeouts"
            );
            stream.close();
            return;
        }
        let body = match read_request(&mut stream, self.max_request_bytes) {
            Ok(body) => body,
            Err(error) => {
                warn!(
                    target: LISTENER_TARGET,
                    request = id,
                    peer = ?stream.peer(),
                    %error,
                    "failed to read request"
                );
                stream.close();
                return;
            }
        };

        let decoded = match body {
            RequestBody::Complete(bytes) => CommandEnvelope::decode(&bytes),
            RequestBody::TooLarge => Err(DecodeError::RequestTooLarge {
                max_size: self.max_request_bytes,
            }),
        };

        match decoded {
            Ok(envelope) => {
                debug!(
                    target: LISTENER_TARGET,
                    request = id,
                    identifier = envelope.identifier(),
                    "request queued"
                );
                stream.release_tracking();
                self.queue
                    .enqueue(PendingRequest::new(id, envelope, Box::new(stream)));
            }
            Err(error) => {
                debug!(target: LISTENER_TARGET, request = id, %error, "rejecting request");
                reject(&mut stream, &error);
            }
        }
    }
}

/// Outcome of the single bounded read.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RequestBody {
    Complete(Vec<u8>),
    TooLarge,
}

/// Performs exactly one read of at most `max_request_bytes + 1` bytes.
///
/// Receiving more than `max_request_bytes` means the body did not fit and is
/// reported instead of being silently truncated.
pub(crate) fn read_request<R: Read>(
    stream: &mut R,
    max_request_bytes: usize,
) -> io::Result<RequestBody> {
    let mut buffer = vec![0_u8; max_request_bytes.saturating_add(1)];
    let read = loop {
        match stream.read(&mut buffer) {
            Ok(read) => break read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    };
    if read > max_request_bytes {
        return Ok(RequestBody::TooLarge);
    }
    buffer.truncate(read);
    Ok(RequestBody::Complete(buffer))
}

fn reject(stream: &mut ConnectionStream, error: &DecodeError) {
    let response = ResponseEnvelope::from(error);
    if let Err(write_error) = stream
        .write_all(&response.encode())
        .and_then(|()| stream.flush())
    {
        warn!(
            target: LISTENER_TARGET,
            error = %write_error,
            "failed to write decode error"
        );
    }
    stream.close();
}

#[cfg(test)]
mod tests {
    #![expect(clippy::expect_used, reason = "tests fail loudly on setup errors")]

    use super::*;
    use std::io::Cursor;
    use std::net::TcpListener;
    use std::thread;

    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::fits(b"{\"type\":\"Ping\"}".to_vec(), 64)]
    #[case::exact(vec![b' '; 16], 16)]
    #[case::empty(Vec::new(), 16)]
    fn bodies_within_limit_are_complete(#[case] body: Vec<u8>, #[case] limit: usize) {
        let outcome = read_request(&mut Cursor::new(body.clone()), limit).expect("read body");
        assert_eq!(outcome, RequestBody::Complete(body));
    }

    #[test]
    fn oversized_bodies_are_reported() {
        let outcome = read_request(&mut Cursor::new(vec![b'x'; 17]), 16).expect("read body");
        assert_eq!(outcome, RequestBody::TooLarge);
    }

    fn serve_one(handler: QueueingHandler) -> (std::net::SocketAddr, thread::JoinHandle<()>) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind listener");
        let addr = listener.local_addr().expect("listener address");
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept connection");
            handler.handle(ConnectionStream::new(stream));
        });
        (addr, server)
    }

    #[test]
    fn decoded_requests_are_queued_without_a_response() {
        let queue = Arc::new(DispatchQueue::new());
        let (addr, server) = serve_one(QueueingHandler::new(Arc::clone(&queue), 1024));

        let mut client = TcpStream::connect(addr).expect("connect client");
        client
            .write_all(br#"{"type":"scene.Create","parameters":{"name":"Cube"}}"#)
            .expect("write request");
        server.join().expect("join server");

        let pending = queue.try_dequeue_all();
        assert_eq!(pending.len(), 1);
        let envelope = pending.first().expect("queued request").envelope();
        assert_eq!(envelope.identifier(), "scene.Create");
        assert_eq!(envelope.parameters(), &json!({"name": "Cube"}));
    }

    #[rstest]
    #[case::not_json(b"not json".as_slice(), "Invalid JSON")]
    #[case::missing_type(br#"{"parameters":{}}"#.as_slice(), "Command type is required")]
    #[case::too_large(&[b'x'; 33], "Request exceeds the 32 byte limit")]
    fn decode_failures_are_answered_immediately(#[case] body: &[u8], #[case] expected: &str) {
        let queue = Arc::new(DispatchQueue::new());
        let (addr, server) = serve_one(QueueingHandler::new(Arc::clone(&queue), 32));

        let mut client = TcpStream::connect(addr).expect("connect client");
        client.write_all(body).expect("write request");
        let mut response = Vec::new();
        client.read_to_end(&mut response).expect("read response");
        server.join().expect("join server");

        let envelope = ResponseEnvelope::decode(&response).expect("decode response");
        match envelope {
            ResponseEnvelope::Error { message } => {
                assert!(message.contains(expected), "unexpected message: {message}");
            }
            other => panic!("expected error envelope, got {other:?}"),
        }
        assert!(queue.is_empty(), "decode failures must not be queued");
    }

    #[test]
    fn silent_clients_are_dropped_after_the_read_timeout() {
        let queue = Arc::new(DispatchQueue::new());
        let handler = QueueingHandler::new(Arc::clone(&queue), 1024)
            .with_timeouts(Some(Duration::from_millis(100)), None);
        let (addr, server) = serve_one(handler);

        let mut client = TcpStream::connect(addr).expect("connect client");
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("bound client read");
        let mut response = Vec::new();
        client
            .read_to_end(&mut response)
            .expect("server should close the idle connection");
        server.join().expect("join server");

        assert!(response.is_empty(), "idle clients get no response");
        assert!(queue.is_empty());
    }
}
