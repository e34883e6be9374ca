//! Commands accepted now and executed on a later tick.
//!
//! Submission only records the command. The executor runs it at the start
//! of the next tick, before any queued request, so a client polling with
//! `GetAsyncStatus` sees the outcome one tick later.

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::envelope::CommandEnvelope;
use crate::executor::{CommandContext, DeferredOperation, OperationStatus};
use crate::registry::{HandlerFault, HandlerResult};

const COMMAND_TYPE_REQUIRED: &str = "Command type is required";
const OPERATION_ID_REQUIRED: &str = "Operation ID is required";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct OperationQuery {
    operation_id: Option<u64>,
}

impl OperationQuery {
    fn parse(parameters: Value) -> Result<u64, HandlerFault> {
        let query: Self = serde_json::from_value(parameters)?;
        query
            .operation_id
            .ok_or_else(|| HandlerFault::new(OPERATION_ID_REQUIRED))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListQuery {
    status: Option<OperationStatus>,
}

/// Defers `commandType` with its optional `parameters` object to a later
/// tick and returns the operation identifier.
///
/// # Errors
///
/// Returns a [`HandlerFault`] when `commandType` is missing or blank, or
/// when `parameters` is not an object.
pub fn async_execute(context: &CommandContext<'_>, parameters: Value) -> HandlerResult {
    let Value::Object(mut request) = parameters else {
        return Err(HandlerFault::new(COMMAND_TYPE_REQUIRED));
    };
    let command_type = match request.remove("commandType") {
        Some(Value::String(command_type)) if !command_type.trim().is_empty() => command_type,
        _ => return Err(HandlerFault::new(COMMAND_TYPE_REQUIRED)),
    };
    let forwarded = request
        .remove("parameters")
        .unwrap_or_else(|| Value::Object(Map::new()));
    let envelope = CommandEnvelope::from_value(json!({
        "type": command_type,
        "parameters": forwarded,
    }))
    .map_err(|error| HandlerFault::new(error.to_string()))?;

    let identifier = envelope.identifier().to_owned();
    let operation_id = context.journal().defer(envelope, context.tick());
    Ok(json!({
        "operationId": operation_id,
        "status": OperationStatus::Pending,
        "message": format!("Operation queued for command: {identifier}"),
    }))
}

/// Returns the full record of one deferred operation.
///
/// # Errors
///
/// Returns a [`HandlerFault`] when `operationId` is missing or unknown.
pub fn get_async_status(context: &CommandContext<'_>, parameters: Value) -> HandlerResult {
    let operation_id = OperationQuery::parse(parameters)?;
    let operation = context
        .journal()
        .operation(operation_id)
        .ok_or_else(|| HandlerFault::new(format!("No operation found with ID: {operation_id}")))?;
    Ok(json!({ "operation": operation }))
}

/// Cancels a deferred operation that has not started yet.
///
/// # Errors
///
/// Returns a [`HandlerFault`] when `operationId` is missing, unknown, or
/// names an operation that already ran or was cancelled.
pub fn cancel_async_operation(context: &CommandContext<'_>, parameters: Value) -> HandlerResult {
    let operation_id = OperationQuery::parse(parameters)?;
    if !context.journal().cancel(operation_id, context.tick()) {
        return Err(HandlerFault::new(format!(
            "No pending operation found with ID: {operation_id}"
        )));
    }
    Ok(json!({
        "operationId": operation_id,
        "message": "Operation cancelled successfully",
    }))
}

/// Lists known operations in submission order, optionally filtered by
/// `status`.
///
/// # Errors
///
/// Returns a [`HandlerFault`] when `status` names no known status.
pub fn list_async_operations(context: &CommandContext<'_>, parameters: Value) -> HandlerResult {
    let query: ListQuery = serde_json::from_value(parameters)?;
    let operations: Vec<Value> = context
        .journal()
        .operations(query.status)
        .iter()
        .map(DeferredOperation::summary)
        .collect();
    Ok(json!({ "count": operations.len(), "operations": operations }))
}
