//! Inspection of the recent failure history.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::executor::{CommandContext, FaultKind};
use crate::registry::{HandlerFault, HandlerResult};

const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LogQuery {
    limit: usize,
    error_type: Option<FaultKind>,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            error_type: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DetailQuery {
    error_id: Option<u64>,
}

/// Lists the most recent failures, oldest first.
///
/// Accepts an optional `limit` (default 10) and an `errorType` filter.
///
/// # Errors
///
/// Returns a [`HandlerFault`] when the parameters do not deserialise.
pub fn get_error_logs(context: &CommandContext<'_>, parameters: Value) -> HandlerResult {
    let query: LogQuery = serde_json::from_value(parameters)?;
    let journal = context.journal();
    let errors = journal.recent_faults(query.limit, query.error_type);
    Ok(json!({
        "count": errors.len(),
        "totalRecorded": journal.faults_recorded(),
        "errors": errors,
    }))
}

/// Returns one failure by `errorId`.
///
/// # Errors
///
/// Returns a [`HandlerFault`] when `errorId` is missing or no longer held.
pub fn get_error_details(context: &CommandContext<'_>, parameters: Value) -> HandlerResult {
    let query: DetailQuery = serde_json::from_value(parameters)?;
    let error_id = query
        .error_id
        .ok_or_else(|| HandlerFault::new("Error ID is required"))?;
    let record = context
        .journal()
        .fault(error_id)
        .ok_or_else(|| HandlerFault::new(format!("Error with ID {error_id} not found")))?;
    Ok(json!({ "error": record }))
}

/// Empties the failure history.
pub fn clear_error_logs(context: &CommandContext<'_>, _parameters: Value) -> HandlerResult {
    let cleared = context.journal().clear_faults();
    Ok(json!({ "message": "Error logs cleared", "cleared": cleared }))
}
