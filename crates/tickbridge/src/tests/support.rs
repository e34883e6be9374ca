//! In-memory connections and shared fixtures for the bridge test suites.
#![expect(clippy::expect_used, reason = "tests fail loudly on setup errors")]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::envelope::ResponseEnvelope;
use crate::transport::ResponseStream;

#[derive(Debug, Default)]
struct Recorded {
    bytes: Vec<u8>,
    closed: bool,
}

/// Response stream that keeps everything written to it in memory.
#[derive(Debug)]
pub(crate) struct RecordingStream {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingStream {
    /// Returns the stream together with a capture observing it after the
    /// stream has been moved into the queue.
    pub(crate) fn new() -> (Self, ResponseCapture) {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let capture = ResponseCapture {
            recorded: Arc::clone(&recorded),
        };
        (Self { recorded }, capture)
    }
}

impl Write for RecordingStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut recorded = self.recorded.lock().expect("recording lock");
        if recorded.closed {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        recorded.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ResponseStream for RecordingStream {
    fn close(&mut self) {
        self.recorded.lock().expect("recording lock").closed = true;
    }
}

/// Read side of a [`RecordingStream`].
#[derive(Debug, Clone)]
pub(crate) struct ResponseCapture {
    recorded: Arc<Mutex<Recorded>>,
}

impl ResponseCapture {
    /// Decodes the single response written so far.
    pub(crate) fn response(&self) -> ResponseEnvelope {
        let recorded = self.recorded.lock().expect("recording lock");
        let text = std::str::from_utf8(&recorded.bytes).expect("utf8 response");
        assert_eq!(
            text.matches('\n').count(),
            1,
            "expected exactly one newline-terminated response, got {text:?}"
        );
        ResponseEnvelope::decode(&recorded.bytes).expect("decode response")
    }

    /// Returns true once the executor closed the stream.
    pub(crate) fn is_closed(&self) -> bool {
        self.recorded.lock().expect("recording lock").closed
    }
}

/// Response stream whose writes always fail.
#[derive(Debug)]
pub(crate) struct FailingStream;

impl Write for FailingStream {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::ConnectionReset))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::ConnectionReset))
    }
}

impl ResponseStream for FailingStream {
    fn close(&mut self) {}
}
