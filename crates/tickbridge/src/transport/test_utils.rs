//! Test helpers for the transport module.

use std::io::Read;
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
    mpsc::{self, Receiver, Sender},
};

use super::{ConnectionHandler, ConnectionStream};

/// Counts connections and drops them without reading.
pub(crate) struct CountingHandler {
    count: Arc<AtomicUsize>,
}

impl CountingHandler {
    pub(crate) fn new() -> (Arc<AtomicUsize>, Arc<Self>) {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Self {
            count: Arc::clone(&count),
        });
        (count, handler)
    }
}

impl ConnectionHandler for CountingHandler {
    fn handle(&self, _stream: ConnectionStream) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Blocks reading until the peer or the acceptor closes the socket, then
/// records how many bytes arrived.
pub(crate) struct DrainingHandler {
    finished: Arc<AtomicUsize>,
}

impl DrainingHandler {
    pub(crate) fn new() -> (Arc<AtomicUsize>, Arc<Self>) {
        let finished = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Self {
            finished: Arc::clone(&finished),
        });
        (finished, handler)
    }
}

impl ConnectionHandler for DrainingHandler {
    fn handle(&self, mut stream: ConnectionStream) {
        let mut sink = Vec::new();
        let _outcome = stream.read_to_end(&mut sink);
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// Leaves the in-flight set and hands the stream to the test, the way a
/// queued request leaves it for the executor.
pub(crate) struct ParkingHandler {
    parked: Mutex<Sender<ConnectionStream>>,
}

impl ParkingHandler {
    pub(crate) fn new() -> (Receiver<ConnectionStream>, Arc<Self>) {
        let (sender, receiver) = mpsc::channel();
        let handler = Arc::new(Self {
            parked: Mutex::new(sender),
        });
        (receiver, handler)
    }
}

impl ConnectionHandler for ParkingHandler {
    fn handle(&self, mut stream: ConnectionStream) {
        stream.release_tracking();
        let sender = self.parked.lock().unwrap_or_else(PoisonError::into_inner);
        let _delivered = sender.send(stream);
    }
}
