//! Fixed-rate tick loop for hosts without a frame scheduler of their own.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::info;

use crate::bridge::Bridge;
use crate::subsystem::{LIFECYCLE_TARGET, SubsystemError};
use crate::transport::ListenerError;

/// Errors that end the reference host.
#[derive(Debug, Error)]
pub enum HostError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Signals {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A subsystem could not be registered.
    #[error(transparent)]
    Subsystem(#[from] SubsystemError),
    /// The listener could not be started or stopped cleanly.
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Counters gathered over one run of [`run_until`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostSummary {
    /// Ticks pumped.
    pub ticks: u64,
    /// Requests answered during those ticks.
    pub processed: usize,
    /// Requests refused because the listener had stopped, including those
    /// still queued at shutdown.
    pub discarded: usize,
}

/// Starts the bridge, pumps a tick every `interval` until `shutdown` is set,
/// then stops the bridge and shuts its subsystems down.
///
/// # Errors
///
/// Returns [`HostError::Listener`] when the listener fails to start or its
/// thread panicked.
pub fn run_until(
    bridge: &mut Bridge,
    interval: Duration,
    shutdown: &AtomicBool,
) -> Result<HostSummary, HostError> {
    let addr = bridge.start()?;
    let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
    info!(target: LIFECYCLE_TARGET, %addr, interval_ms, "host loop running");

    let mut summary = HostSummary::default();
    while !shutdown.load(Ordering::SeqCst) {
        let started = Instant::now();
        let report = bridge.on_tick();
        summary.ticks = report.tick;
        summary.processed += report.processed;
        summary.discarded += report.discarded;
        if let Some(remaining) = interval.checked_sub(started.elapsed()) {
            thread::sleep(remaining);
        }
    }

    summary.discarded += bridge.stop()?;
    bridge.shutdown_all();
    info!(
        target: LIFECYCLE_TARGET,
        ticks = summary.ticks,
        processed = summary.processed,
        discarded = summary.discarded,
        "host loop finished"
    );
    Ok(summary)
}
