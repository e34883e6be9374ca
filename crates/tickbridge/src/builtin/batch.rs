//! Sequential execution of several commands inside one request.

use std::time::Instant;

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::envelope::{CommandEnvelope, DEFAULT_SUBSYSTEM, DecodeError, ResponseEnvelope};
use crate::executor::{CommandContext, DISPATCH_TARGET};
use crate::registry::{CommandIdentifier, HandlerFault, HandlerResult};

use super::BATCH_EXECUTE;

const INVALID_COMMANDS: &str =
    "Invalid commands parameter. Expected a non-empty array of command objects.";

/// Runs every entry of `parameters.commands` in order within the current
/// tick.
///
/// Entries fail independently: a malformed or failing entry adds to
/// `errors` and execution continues with the next one. Nested batches are
/// refused per entry.
///
/// # Errors
///
/// Returns a [`HandlerFault`] when `commands` is missing, not an array or
/// empty.
pub fn batch_execute(context: &CommandContext<'_>, parameters: Value) -> HandlerResult {
    let Value::Object(mut request) = parameters else {
        return Err(HandlerFault::new(INVALID_COMMANDS));
    };
    let commands = match request.remove("commands") {
        Some(Value::Array(commands)) if !commands.is_empty() => commands,
        _ => return Err(HandlerFault::new(INVALID_COMMANDS)),
    };

    let started = Instant::now();
    let mut outcome = BatchOutcome::default();
    for (index, command) in commands.into_iter().enumerate() {
        run_entry(context, index, command, &mut outcome);
    }
    let elapsed = started.elapsed().as_secs_f64();

    debug!(
        target: DISPATCH_TARGET,
        commands = outcome.results.len() + outcome.errors.len(),
        failed = outcome.errors.len(),
        "batch executed"
    );
    Ok(outcome.into_value(elapsed))
}

#[derive(Default)]
struct BatchOutcome {
    results: Vec<Value>,
    errors: Vec<Value>,
}

impl BatchOutcome {
    fn fail(&mut self, index: usize, command_type: Option<&str>, error: String) {
        let mut entry = Map::new();
        entry.insert("commandIndex".to_owned(), json!(index));
        if let Some(command_type) = command_type {
            entry.insert("commandType".to_owned(), json!(command_type));
        }
        entry.insert("error".to_owned(), Value::String(error));
        self.errors.push(Value::Object(entry));
    }

    fn into_value(self, elapsed: f64) -> Value {
        let command_count = self.results.len() + self.errors.len();
        json!({
            "success": self.errors.is_empty(),
            "commandCount": command_count,
            "successCount": self.results.len(),
            "errorCount": self.errors.len(),
            "executionTime": elapsed,
            "results": self.results,
            "errors": self.errors,
        })
    }
}

fn run_entry(context: &CommandContext<'_>, index: usize, command: Value, outcome: &mut BatchOutcome) {
    let envelope = match CommandEnvelope::from_value(command) {
        Ok(envelope) => envelope,
        Err(error) => {
            outcome.fail(index, None, entry_error(index, &error));
            return;
        }
    };
    let command_type = envelope.identifier().to_owned();

    if CommandIdentifier::parse(&command_type).is_ok_and(|id| is_batch(&id)) {
        outcome.fail(
            index,
            Some(&command_type),
            format!("{BATCH_EXECUTE} cannot be nested"),
        );
        return;
    }

    let started = Instant::now();
    let response = context.dispatch(envelope);
    let elapsed = started.elapsed().as_secs_f64();
    match response {
        ResponseEnvelope::Success { result } => outcome.results.push(json!({
            "commandType": command_type,
            "executionTime": elapsed,
            "result": result,
        })),
        ResponseEnvelope::Error { message } => outcome.fail(index, Some(&command_type), message),
    }
}

fn is_batch(identifier: &CommandIdentifier) -> bool {
    identifier.subsystem() == DEFAULT_SUBSYSTEM
        && identifier.action() == BATCH_EXECUTE
}

fn entry_error(index: usize, error: &DecodeError) -> String {
    match error {
        DecodeError::NotAnObject => format!("Command at index {index} is not a valid object"),
        DecodeError::MissingType => {
            format!("Command at index {index} is missing required 'type' property")
        }
        other => format!("Command at index {index} is invalid: {other}"),
    }
}
