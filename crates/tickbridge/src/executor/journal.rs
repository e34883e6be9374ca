//! Host-thread bookkeeping shared by the executor and the `core` handlers.
//!
//! The journal keeps two records that outlive a single request: a bounded
//! history of failed commands, and the table of operations deferred to a
//! later tick. Handlers only ever see it through [`CommandContext`], on the
//! host thread, so interior mutability is enough.
//!
//! [`CommandContext`]: super::CommandContext

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::envelope::{CommandEnvelope, ResponseEnvelope};

/// Failed commands kept for inspection before the oldest are dropped.
pub const FAULT_HISTORY_CAPACITY: usize = 100;

/// Finished deferred operations kept before the oldest are dropped.
pub const FINISHED_OPERATION_CAPACITY: usize = 100;

/// Where a recorded failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    /// The command type was malformed or named no registered handler.
    #[serde(rename = "RoutingError")]
    Routing,
    /// A handler ran and reported a fault or panicked.
    #[serde(rename = "CommandExecutionError")]
    CommandExecution,
    /// A deferred operation failed when its tick came.
    #[serde(rename = "AsyncCommandExecutionError")]
    AsyncCommandExecution,
}

/// One entry of the failure history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultRecord {
    /// Identifier unique for the lifetime of the executor.
    pub error_id: u64,
    /// Failure category.
    pub error_type: FaultKind,
    /// Message sent to the client.
    pub message: String,
    /// Command type as the client wrote it.
    pub command: String,
    /// Tick during which the failure happened.
    pub tick: u64,
    /// Wall-clock time of the failure in milliseconds since the Unix epoch.
    pub recorded_at: u64,
    /// Extra details, such as the deferred operation that failed.
    pub context: Value,
}

/// Lifecycle of a deferred operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Waiting for a later tick.
    Pending,
    /// Executing on the current tick.
    Running,
    /// Finished with a success envelope.
    Completed,
    /// Finished with an error envelope.
    Failed,
    /// Cancelled before it ran.
    Cancelled,
}

impl OperationStatus {
    const fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// A command accepted now and executed on a later tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredOperation {
    /// Identifier returned to the submitting client.
    pub operation_id: u64,
    /// Command type to execute.
    pub command_type: String,
    /// Parameters forwarded to the handler.
    pub parameters: Value,
    /// Current status.
    pub status: OperationStatus,
    /// Tick during which the operation was submitted.
    pub created_tick: u64,
    /// Tick during which the operation finished or was cancelled.
    pub completed_tick: Option<u64>,
    /// Handler result once completed.
    pub result: Option<Value>,
    /// Error message once failed.
    pub error: Option<String>,
    /// Handler run time in seconds once finished.
    pub execution_time: Option<f64>,
}

impl DeferredOperation {
    /// Compact view used when listing operations.
    #[must_use]
    pub fn summary(&self) -> Value {
        json!({
            "operationId": self.operation_id,
            "commandType": self.command_type,
            "status": self.status,
            "createdTick": self.created_tick,
            "completedTick": self.completed_tick,
        })
    }
}

/// Failure history and deferred operations for one executor.
#[derive(Debug, Default)]
pub struct CommandJournal {
    faults: RefCell<FaultHistory>,
    deferred: RefCell<DeferredOperations>,
}

#[derive(Debug, Default)]
struct FaultHistory {
    entries: VecDeque<FaultRecord>,
    next_id: u64,
}

#[derive(Debug, Default)]
struct DeferredOperations {
    operations: BTreeMap<u64, DeferredOperation>,
    next_id: u64,
}

/// Details of a failure about to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultDraft {
    /// Failure category.
    pub kind: FaultKind,
    /// Message sent to the client.
    pub message: String,
    /// Command type as the client wrote it.
    pub command: String,
    /// Tick during which the failure happened.
    pub tick: u64,
    /// Extra details.
    pub context: Value,
}

impl CommandJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a failure, evicting the oldest beyond
    /// [`FAULT_HISTORY_CAPACITY`].
    pub fn record_fault(&self, draft: FaultDraft) {
        let mut history = self.faults.borrow_mut();
        history.next_id = history.next_id.saturating_add(1);
        let error_id = history.next_id;
        history.entries.push_back(FaultRecord {
            error_id,
            error_type: draft.kind,
            message: draft.message,
            command: draft.command,
            tick: draft.tick,
            recorded_at: unix_millis(),
            context: draft.context,
        });
        while history.entries.len() > FAULT_HISTORY_CAPACITY {
            history.entries.pop_front();
        }
    }

    /// The most recent `limit` failures, oldest first, optionally restricted
    /// to one category.
    #[must_use]
    pub fn recent_faults(&self, limit: usize, kind: Option<FaultKind>) -> Vec<FaultRecord> {
        let history = self.faults.borrow();
        let mut recent: Vec<FaultRecord> = history
            .entries
            .iter()
            .rev()
            .filter(|record| kind.is_none_or(|wanted| record.error_type == wanted))
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        recent
    }

    /// Looks up one failure by identifier.
    #[must_use]
    pub fn fault(&self, error_id: u64) -> Option<FaultRecord> {
        self.faults
            .borrow()
            .entries
            .iter()
            .find(|record| record.error_id == error_id)
            .cloned()
    }

    /// Failures currently retained.
    #[must_use]
    pub fn fault_count(&self) -> usize {
        self.faults.borrow().entries.len()
    }

    /// Failures recorded since the executor was created, including evicted
    /// and cleared ones.
    #[must_use]
    pub fn faults_recorded(&self) -> u64 {
        self.faults.borrow().next_id
    }

    /// Empties the history. Identifiers keep increasing afterwards. Returns
    /// how many records were dropped.
    #[must_use = "the count reports how many records were dropped"]
    pub fn clear_faults(&self) -> usize {
        let mut history = self.faults.borrow_mut();
        let cleared = history.entries.len();
        history.entries.clear();
        cleared
    }

    /// Accepts a command for execution on a later tick and returns its
    /// operation identifier.
    #[must_use = "the identifier is the only handle on the operation"]
    pub fn defer(&self, envelope: CommandEnvelope, tick: u64) -> u64 {
        let (command_type, parameters) = envelope.into_parts();
        let mut deferred = self.deferred.borrow_mut();
        deferred.next_id = deferred.next_id.saturating_add(1);
        let operation_id = deferred.next_id;
        deferred.operations.insert(
            operation_id,
            DeferredOperation {
                operation_id,
                command_type,
                parameters,
                status: OperationStatus::Pending,
                created_tick: tick,
                completed_tick: None,
                result: None,
                error: None,
                execution_time: None,
            },
        );
        operation_id
    }

    /// Looks up one operation by identifier.
    #[must_use]
    pub fn operation(&self, operation_id: u64) -> Option<DeferredOperation> {
        self.deferred.borrow().operations.get(&operation_id).cloned()
    }

    /// Every known operation in submission order, optionally restricted to
    /// one status.
    #[must_use]
    pub fn operations(&self, status: Option<OperationStatus>) -> Vec<DeferredOperation> {
        self.deferred
            .borrow()
            .operations
            .values()
            .filter(|operation| status.is_none_or(|wanted| operation.status == wanted))
            .cloned()
            .collect()
    }

    /// Cancels a pending operation. Returns false when the operation is
    /// unknown or no longer pending.
    #[must_use = "cancellation fails for operations that already started"]
    pub fn cancel(&self, operation_id: u64, tick: u64) -> bool {
        let mut deferred = self.deferred.borrow_mut();
        let cancelled = match deferred.operations.get_mut(&operation_id) {
            Some(operation) if operation.status == OperationStatus::Pending => {
                operation.status = OperationStatus::Cancelled;
                operation.completed_tick = Some(tick);
                true
            }
            _ => false,
        };
        if cancelled {
            deferred.prune();
        }
        cancelled
    }

    /// Pending operations submitted before `tick`, in submission order.
    pub(crate) fn due(&self, tick: u64) -> Vec<u64> {
        self.deferred
            .borrow()
            .operations
            .values()
            .filter(|operation| {
                operation.status == OperationStatus::Pending && operation.created_tick < tick
            })
            .map(|operation| operation.operation_id)
            .collect()
    }

    /// Marks a pending operation as running and returns the command to
    /// execute. Returns `None` when it was cancelled in the meantime.
    pub(crate) fn begin(&self, operation_id: u64) -> Option<CommandEnvelope> {
        let mut deferred = self.deferred.borrow_mut();
        let operation = deferred.operations.get_mut(&operation_id)?;
        if operation.status != OperationStatus::Pending {
            return None;
        }
        operation.status = OperationStatus::Running;
        Some(CommandEnvelope::new(
            operation.command_type.clone(),
            operation.parameters.clone(),
        ))
    }

    /// Stores the outcome of a running operation.
    pub(crate) fn finish(
        &self,
        operation_id: u64,
        response: ResponseEnvelope,
        elapsed: Duration,
        tick: u64,
    ) {
        let mut deferred = self.deferred.borrow_mut();
        let Some(operation) = deferred.operations.get_mut(&operation_id) else {
            return;
        };
        match response {
            ResponseEnvelope::Success { result } => {
                operation.status = OperationStatus::Completed;
                operation.result = Some(result);
            }
            ResponseEnvelope::Error { message } => {
                operation.status = OperationStatus::Failed;
                operation.error = Some(message);
            }
        }
        operation.completed_tick = Some(tick);
        operation.execution_time = Some(elapsed.as_secs_f64());
        deferred.prune();
    }
}

impl DeferredOperations {
    /// Drops the oldest finished operations beyond
    /// [`FINISHED_OPERATION_CAPACITY`]. Pending and running ones are kept.
    fn prune(&mut self) {
        let finished: Vec<u64> = self
            .operations
            .values()
            .filter(|operation| operation.status.is_finished())
            .map(|operation| operation.operation_id)
            .collect();
        let excess = finished.len().saturating_sub(FINISHED_OPERATION_CAPACITY);
        for operation_id in finished.into_iter().take(excess) {
            self.operations.remove(&operation_id);
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |since| u64::try_from(since.as_millis()).unwrap_or(u64::MAX))
}
