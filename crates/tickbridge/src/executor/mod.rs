//! Tick-driven command execution.
//!
//! The executor is the only component that runs handlers. The host calls
//! [`CommandExecutor::on_tick`] once per frame on its main thread; every
//! request queued since the previous tick is routed, executed, answered and
//! closed before the call returns. Only operations a client explicitly
//! deferred carry over, and they run at the start of a later tick.

mod context;
mod journal;
mod metrics;

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::envelope::{CommandEnvelope, ResponseEnvelope};
use crate::queue::DispatchQueue;
use crate::registry::HandlerRegistry;
use crate::transport::ResponseStream;

pub use self::context::CommandContext;
use self::context::dispatch;
pub use self::journal::{
    CommandJournal, DeferredOperation, FAULT_HISTORY_CAPACITY, FINISHED_OPERATION_CAPACITY,
    FaultDraft, FaultKind, FaultRecord, OperationStatus,
};
pub use self::metrics::{CommandMetrics, CommandStats};

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// What a tick does with the requests it drains.
#[derive(Clone, Copy)]
enum Intake<'a> {
    Execute,
    Refuse(&'a str),
}

/// Summary of one pump invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number, starting at 1 for the first pump.
    pub tick: u64,
    /// Requests answered this tick.
    pub processed: usize,
    /// Requests answered with an error envelope.
    pub failed: usize,
    /// Responses that could not be written back.
    pub write_failures: usize,
    /// Deferred operations executed at the start of this tick.
    pub deferred: usize,
    /// Requests refused because the bridge had stopped.
    pub discarded: usize,
}

/// Drains the dispatch queue and runs handlers on the host thread.
#[derive(Debug)]
pub struct CommandExecutor {
    queue: Arc<DispatchQueue>,
    registry: HandlerRegistry,
    metrics: CommandMetrics,
    journal: CommandJournal,
    tick: u64,
}

impl CommandExecutor {
    /// Creates an executor reading from `queue`.
    #[must_use]
    pub fn new(queue: Arc<DispatchQueue>) -> Self {
        Self {
            queue,
            registry: HandlerRegistry::new(),
            metrics: CommandMetrics::default(),
            journal: CommandJournal::new(),
            tick: 0,
        }
    }

    /// Handler registry.
    #[must_use]
    pub const fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Mutable handler registry for subsystem registration.
    pub const fn registry_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    /// Execution metrics.
    #[must_use]
    pub const fn metrics(&self) -> &CommandMetrics {
        &self.metrics
    }

    /// Failure history and deferred operations.
    #[must_use]
    pub const fn journal(&self) -> &CommandJournal {
        &self.journal
    }

    /// Ticks pumped so far.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Runs deferred operations that are due, then processes every request
    /// queued since the previous tick, in order.
    pub fn on_tick(&mut self) -> TickReport {
        self.pump(Intake::Execute)
    }

    /// Ticks without executing queued requests: each one is answered with
    /// `message` instead. Deferred operations still run.
    pub fn on_tick_refusing(&mut self, message: &str) -> TickReport {
        self.pump(Intake::Refuse(message))
    }

    fn pump(&mut self, intake: Intake<'_>) -> TickReport {
        self.tick = self.tick.saturating_add(1);
        let mut report = TickReport {
            tick: self.tick,
            deferred: self.run_deferred(),
            ..TickReport::default()
        };

        for request in self.queue.try_dequeue_all() {
            let (id, envelope, connection) = request.into_parts();
            let response = match intake {
                Intake::Refuse(message) => {
                    report.discarded += 1;
                    ResponseEnvelope::error(message)
                }
                Intake::Execute => {
                    let executed = self.execute(envelope);
                    report.processed += 1;
                    if executed.is_error() {
                        report.failed += 1;
                    }
                    executed
                }
            };
            if !respond(id, connection, &response) {
                report.write_failures += 1;
            }
        }

        if report.processed > 0 || report.deferred > 0 || report.discarded > 0 {
            debug!(
                target: DISPATCH_TARGET,
                tick = report.tick,
                processed = report.processed,
                failed = report.failed,
                write_failures = report.write_failures,
                deferred = report.deferred,
                discarded = report.discarded,
                "tick processed"
            );
        }
        report
    }

    /// Routes and executes one command synchronously.
    pub fn execute(&mut self, envelope: CommandEnvelope) -> ResponseEnvelope {
        self.run(envelope, None)
    }

    /// Answers every queued request with an error and returns how many were
    /// discarded.
    pub fn discard_pending(&mut self, message: &str) -> usize {
        let pending = self.queue.try_dequeue_all();
        let discarded = pending.len();
        let response = ResponseEnvelope::error(message);
        for request in pending {
            let (id, _, connection) = request.into_parts();
            respond(id, connection, &response);
        }
        discarded
    }

    fn run_deferred(&mut self) -> usize {
        let mut ran = 0;
        for operation_id in self.journal.due(self.tick) {
            let Some(envelope) = self.journal.begin(operation_id) else {
                continue;
            };
            let started = Instant::now();
            let response = self.run(envelope, Some(operation_id));
            self.journal
                .finish(operation_id, response, started.elapsed(), self.tick);
            ran += 1;
        }
        ran
    }

    fn run(&mut self, envelope: CommandEnvelope, operation: Option<u64>) -> ResponseEnvelope {
        let started = Instant::now();
        let command_type = envelope.identifier().to_owned();
        let outcome = {
            let context =
                CommandContext::new(&self.registry, &self.metrics, &self.journal, self.tick);
            dispatch(&context, envelope)
        };
        let elapsed = started.elapsed();

        if let Some(command) = &outcome.command {
            let canonical = command.to_string();
            self.metrics
                .record(&canonical, elapsed, outcome.response.is_error(), self.tick);
            debug!(
                target: DISPATCH_TARGET,
                command = %canonical,
                elapsed_us = micros(elapsed),
                failed = outcome.response.is_error(),
                "command executed"
            );
        }

        if let ResponseEnvelope::Error { message } = &outcome.response {
            let kind = match (operation, &outcome.command) {
                (Some(_), _) => FaultKind::AsyncCommandExecution,
                (None, Some(_)) => FaultKind::CommandExecution,
                (None, None) => FaultKind::Routing,
            };
            self.journal.record_fault(FaultDraft {
                kind,
                message: message.clone(),
                command: command_type,
                tick: self.tick,
                context: operation.map_or(Value::Null, |id| json!({ "operationId": id })),
            });
        }
        outcome.response
    }
}

fn micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

/// Writes the response and closes the connection. Returns false when the
/// write failed.
fn respond(
    id: u64,
    mut connection: Box<dyn ResponseStream>,
    response: &ResponseEnvelope,
) -> bool {
    let bytes = response.encode();
    let outcome = connection
        .write_all(&bytes)
        .and_then(|()| connection.flush());
    connection.close();
    match outcome {
        Ok(()) => true,
        Err(error) => {
            warn!(target: DISPATCH_TARGET, request = id, %error, "failed to write response");
            false
        }
    }
}
