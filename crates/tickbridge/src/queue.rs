//! Hand-off point between connection threads and the host tick.

use std::fmt;
use std::mem;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::envelope::CommandEnvelope;
use crate::transport::ResponseStream;

/// A decoded request waiting for the next tick.
///
/// The connection travels with the request: once enqueued, only the executor
/// touches it.
pub struct PendingRequest {
    id: u64,
    envelope: CommandEnvelope,
    connection: Box<dyn ResponseStream>,
}

impl PendingRequest {
    /// Pairs a decoded envelope with the connection that must receive the
    /// response.
    #[must_use]
    pub fn new(id: u64, envelope: CommandEnvelope, connection: Box<dyn ResponseStream>) -> Self {
        Self {
            id,
            envelope,
            connection,
        }
    }

    /// Connection-scoped request id used in logs.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Decoded request.
    #[must_use]
    pub const fn envelope(&self) -> &CommandEnvelope {
        &self.envelope
    }

    /// Splits the request into its parts.
    #[must_use]
    pub fn into_parts(self) -> (u64, CommandEnvelope, Box<dyn ResponseStream>) {
        (self.id, self.envelope, self.connection)
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("identifier", &self.envelope.identifier())
            .finish_non_exhaustive()
    }
}

/// Unbounded FIFO of pending requests.
///
/// Both operations take the same lock, so an enqueue is either part of a
/// drain or left for the next one.
#[derive(Debug, Default)]
pub struct DispatchQueue {
    pending: Mutex<Vec<PendingRequest>>,
}

impl DispatchQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a request. Never blocks beyond the lock and never drops.
    pub fn enqueue(&self, request: PendingRequest) {
        self.lock().push(request);
    }

    /// Removes and returns everything queued, oldest first.
    #[must_use]
    pub fn try_dequeue_all(&self) -> Vec<PendingRequest> {
        mem::take(&mut *self.lock())
    }

    /// Number of queued requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the vector half-updated,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Vec<PendingRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::expect_used, reason = "tests fail loudly on thread panics")]

    use super::*;
    use crate::tests::support::RecordingStream;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;

    fn request(id: u64) -> PendingRequest {
        let (stream, _) = RecordingStream::new();
        PendingRequest::new(
            id,
            CommandEnvelope::new("core.Ping", json!({ "n": id })),
            Box::new(stream),
        )
    }

    #[test]
    fn drains_in_fifo_order() {
        let queue = DispatchQueue::new();
        for id in 0..5 {
            queue.enqueue(request(id));
        }
        let ids: Vec<u64> = queue.try_dequeue_all().iter().map(PendingRequest::id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn draining_an_empty_queue_returns_nothing() {
        let queue = DispatchQueue::new();
        assert!(queue.try_dequeue_all().is_empty());
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        let queue = Arc::new(DispatchQueue::new());
        let producers: Vec<_> = (0..8)
            .map(|producer| {
                let shared = Arc::clone(&queue);
                thread::spawn(move || {
                    for offset in 0..25 {
                        shared.enqueue(request(producer * 100 + offset));
                    }
                })
            })
            .collect();

        let mut drained = Vec::new();
        for producer in producers {
            producer.join().expect("producer thread");
            drained.extend(queue.try_dequeue_all());
        }
        drained.extend(queue.try_dequeue_all());

        assert_eq!(drained.len(), 200);
        let mut ids: Vec<u64> = drained.iter().map(PendingRequest::id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 200);
    }
}
