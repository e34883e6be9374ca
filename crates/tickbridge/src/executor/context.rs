//! Dispatch context handed to every handler invocation.

use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;
use tracing::debug;

use crate::envelope::{CommandEnvelope, ResponseEnvelope};
use crate::registry::{CommandIdentifier, Handler, HandlerFault, HandlerRegistry};

use super::DISPATCH_TARGET;
use super::journal::CommandJournal;
use super::metrics::CommandMetrics;

/// Read-only view of the bridge state available while a command runs.
///
/// Handlers use it to introspect the registry or to dispatch nested commands
/// (batch execution) without reaching for global state.
pub struct CommandContext<'a> {
    registry: &'a HandlerRegistry,
    metrics: &'a CommandMetrics,
    journal: &'a CommandJournal,
    tick: u64,
}

impl<'a> CommandContext<'a> {
    /// Creates a context over the executor's state.
    #[must_use]
    pub const fn new(
        registry: &'a HandlerRegistry,
        metrics: &'a CommandMetrics,
        journal: &'a CommandJournal,
        tick: u64,
    ) -> Self {
        Self {
            registry,
            metrics,
            journal,
            tick,
        }
    }

    /// Handler registry in effect for this tick.
    #[must_use]
    pub const fn registry(&self) -> &HandlerRegistry {
        self.registry
    }

    /// Execution metrics recorded before this command started.
    #[must_use]
    pub const fn metrics(&self) -> &CommandMetrics {
        self.metrics
    }

    /// Failure history and deferred operations.
    #[must_use]
    pub const fn journal(&self) -> &CommandJournal {
        self.journal
    }

    /// Number of the tick currently being processed.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Routes and executes a nested command within the current tick.
    ///
    /// Nested commands are not recorded in the metrics table.
    #[must_use]
    pub fn dispatch(&self, envelope: CommandEnvelope) -> ResponseEnvelope {
        dispatch(self, envelope).response
    }
}

/// Response together with the canonical identifier it was routed to.
pub(crate) struct Dispatched {
    pub(crate) command: Option<CommandIdentifier>,
    pub(crate) response: ResponseEnvelope,
}

/// Resolves an envelope against the registry and invokes its handler.
pub(crate) fn dispatch(context: &CommandContext<'_>, envelope: CommandEnvelope) -> Dispatched {
    let (identifier, parameters) = envelope.into_parts();
    let command = match CommandIdentifier::parse(&identifier) {
        Ok(command) => command,
        Err(error) => {
            debug!(target: DISPATCH_TARGET, %error, "rejecting malformed identifier");
            return Dispatched {
                command: None,
                response: ResponseEnvelope::error(error.to_string()),
            };
        }
    };

    let handler = match context.registry.resolve_identifier(&command) {
        Ok(handler) => handler,
        Err(error) => {
            debug!(target: DISPATCH_TARGET, %error, "command not routed");
            return Dispatched {
                command: None,
                response: ResponseEnvelope::error(error.to_string()),
            };
        }
    };

    let response = match invoke_guarded(handler, context, parameters) {
        Ok(result) => ResponseEnvelope::success(result),
        Err(fault) => ResponseEnvelope::error(format!("Error executing {command}: {fault}")),
    };
    Dispatched {
        command: Some(command),
        response,
    }
}

/// Invokes a handler, converting panics into faults.
fn invoke_guarded(
    handler: &Handler,
    context: &CommandContext<'_>,
    parameters: Value,
) -> Result<Value, HandlerFault> {
    match panic::catch_unwind(AssertUnwindSafe(|| handler.call(context, parameters))) {
        Ok(outcome) => outcome,
        Err(payload) => Err(HandlerFault::new(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked".to_owned()
    }
}
