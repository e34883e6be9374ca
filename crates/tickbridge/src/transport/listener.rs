//! Accept loop for the bridge's TCP endpoint.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use tickbridge_config::TcpEndpoint;

use super::{ConnectionHandler, ConnectionStream, LISTENER_TARGET, ListenerError, ResponseStream};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Accepts connections on a background thread and hands each one to a
/// [`ConnectionHandler`] on its own thread.
pub struct ConnectionAcceptor {
    handler: Arc<dyn ConnectionHandler>,
    running: Option<RunningListener>,
}

struct RunningListener {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
    active: Arc<ActiveConnections>,
}

impl ConnectionAcceptor {
    /// Creates a stopped acceptor.
    #[must_use]
    pub fn new(handler: Arc<dyn ConnectionHandler>) -> Self {
        Self {
            handler,
            running: None,
        }
    }

    /// Binds `endpoint` and starts accepting.
    ///
    /// Calling `start` while already running does nothing and returns the
    /// address already bound.
    ///
    /// # Errors
    ///
    /// Returns a [`ListenerError`] when the endpoint cannot be resolved or
    /// bound, or when the accept thread cannot be spawned.
    pub fn start(&mut self, endpoint: &TcpEndpoint) -> Result<SocketAddr, ListenerError> {
        if let Some(running) = &self.running {
            debug!(
                target: LISTENER_TARGET,
                addr = %running.local_addr,
                "listener already running"
            );
            return Ok(running.local_addr);
        }

        let (host, port) = endpoint.as_pair();
        let listener = bind_tcp(host, port)?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::LocalAddr { source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| ListenerError::NonBlocking { source })?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let active = Arc::new(ActiveConnections::default());
        let accept_loop = AcceptLoop {
            listener,
            shutdown: Arc::clone(&shutdown),
            active: Arc::clone(&active),
            handler: Arc::clone(&self.handler),
        };
        let handle = thread::Builder::new()
            .name("tickbridge-accept".to_owned())
            .spawn(move || accept_loop.run())
            .map_err(|source| ListenerError::Spawn { source })?;

        info!(target: LISTENER_TARGET, addr = %local_addr, "listener started");
        self.running = Some(RunningListener {
            local_addr,
            shutdown,
            handle,
            active,
        });
        Ok(local_addr)
    }

    /// Stops accepting and closes connections whose request is still being
    /// read. Stopping a stopped acceptor does nothing.
    ///
    /// Requests that were already queued are untouched; their connections
    /// belong to the queue.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] if the accept thread panicked.
    pub fn stop(&mut self) -> Result<(), ListenerError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        running.shutdown.store(true, Ordering::SeqCst);
        let joined = running
            .handle
            .join()
            .map_err(|_| ListenerError::ThreadPanic);
        let abandoned = running.active.close();
        info!(
            target: LISTENER_TARGET,
            addr = %running.local_addr,
            abandoned,
            "listener stopped"
        );
        joined
    }

    /// Returns true while the accept loop is running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Address bound by the running listener.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }

    /// Connections currently being read.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.running
            .as_ref()
            .map_or(0, |running| running.active.len())
    }
}

impl fmt::Debug for ConnectionAcceptor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ConnectionAcceptor")
            .field("local_addr", &self.local_addr())
            .finish_non_exhaustive()
    }
}

impl Drop for ConnectionAcceptor {
    fn drop(&mut self) {
        if let Err(error) = self.stop() {
            warn!(target: LISTENER_TARGET, %error, "listener shutdown failed");
        }
    }
}

struct AcceptLoop {
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    active: Arc<ActiveConnections>,
    handler: Arc<dyn ConnectionHandler>,
}

impl AcceptLoop {
    fn run(self) {
        let mut last_error = None::<io::ErrorKind>;
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.accept() {
                Ok(Some(stream)) => {
                    last_error = None;
                    self.spawn_connection(stream);
                }
                Ok(None) => thread::sleep(ACCEPT_BACKOFF),
                Err(error) => {
                    let kind = error.kind();
                    if last_error != Some(kind) {
                        warn!(target: LISTENER_TARGET, %error, "socket accept error");
                    }
                    last_error = Some(kind);
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }
    }

    fn accept(&self) -> io::Result<Option<ConnectionStream>> {
        match self.listener.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                Ok(Some(ConnectionStream::new(stream)))
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        }
    }

    fn spawn_connection(&self, mut stream: ConnectionStream) {
        let Some(guard) = ActiveConnections::track(&self.active, &stream) else {
            stream.close();
            return;
        };
        stream.attach_tracking(guard);
        let handler = Arc::clone(&self.handler);
        let spawned = thread::Builder::new()
            .name("tickbridge-conn".to_owned())
            .spawn(move || handler.handle(stream));
        if let Err(error) = spawned {
            warn!(target: LISTENER_TARGET, %error, "failed to spawn connection thread");
        }
    }
}

/// Sockets owned by connection threads that have not finished reading.
#[derive(Debug, Default)]
struct ActiveConnections {
    state: Mutex<ActiveState>,
}

#[derive(Debug, Default)]
struct ActiveState {
    closed: bool,
    next_key: u64,
    sockets: HashMap<u64, TcpStream>,
}

impl ActiveConnections {
    /// Registers the stream's socket. Returns `None` once the set is closed or
    /// when the socket cannot be cloned.
    fn track(this: &Arc<Self>, stream: &ConnectionStream) -> Option<ActiveGuard> {
        let socket = match stream.try_clone_socket() {
            Ok(socket) => socket,
            Err(error) => {
                warn!(target: LISTENER_TARGET, %error, "failed to track connection");
                return None;
            }
        };
        let mut state = this.lock();
        if state.closed {
            return None;
        }
        let key = state.next_key;
        state.next_key = state.next_key.wrapping_add(1);
        state.sockets.insert(key, socket);
        Some(ActiveGuard {
            owner: Arc::clone(this),
            key,
        })
    }

    fn len(&self) -> usize {
        self.lock().sockets.len()
    }

    /// Refuses further tracking and shuts down every tracked socket. Returns
    /// how many were shut down.
    fn close(&self) -> usize {
        let sockets = {
            let mut state = self.lock();
            state.closed = true;
            std::mem::take(&mut state.sockets)
        };
        for socket in sockets.values() {
            if let Err(error) = socket.shutdown(Shutdown::Both)
                && error.kind() != io::ErrorKind::NotConnected
            {
                debug!(target: LISTENER_TARGET, %error, "in-flight shutdown failed");
            }
        }
        sockets.len()
    }

    fn lock(&self) -> MutexGuard<'_, ActiveState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps a socket in the in-flight set until dropped.
pub(super) struct ActiveGuard {
    owner: Arc<ActiveConnections>,
    key: u64,
}

impl fmt::Debug for ActiveGuard {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ActiveGuard")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.owner.lock().sockets.remove(&self.key);
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    let addr = addrs.next().ok_or_else(|| ListenerError::ResolveEmpty {
        host: host.to_owned(),
        port,
    })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}
