//! Built-in `core` subsystem: liveness, introspection and batching.
//!
//! | Action | Result |
//! |--------|--------|
//! | `Ping` | `{"pong": true, "tick": n}` |
//! | `GetSystemInfo` | bridge name, version, endpoint and registry size |
//! | `ListCommands` | every registered `subsystem.action`, sorted |
//! | `GetCommandMetrics` | execution statistics, optionally for one command |
//! | `BatchExecute` | runs a list of commands sequentially in the same tick |
//! | `GetErrorLogs` | most recent failures, optionally filtered by type |
//! | `GetErrorDetails` | one failure by `errorId` |
//! | `ClearErrorLogs` | empties the failure history |
//! | `AsyncExecute` | defers a command to a later tick, returns `operationId` |
//! | `GetAsyncStatus` | full record of one deferred operation |
//! | `CancelAsyncOperation` | cancels a deferred operation that has not run |
//! | `ListAsyncOperations` | deferred operations, optionally by `status` |

mod batch;
mod deferred;
mod faults;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::envelope::DEFAULT_SUBSYSTEM;
use crate::executor::CommandContext;
use crate::registry::{HandlerFault, HandlerResult, handler};
use crate::subsystem::{
    BridgeContext, CommandProvider, HandlerTable, InitializationError, Lifecycle, LifecycleCell,
    LifecycleState,
};

pub use self::batch::batch_execute;
pub use self::deferred::{
    async_execute, cancel_async_operation, get_async_status, list_async_operations,
};
pub use self::faults::{clear_error_logs, get_error_details, get_error_logs};

/// Action name of the batch command, which cannot be nested.
pub const BATCH_EXECUTE: &str = "BatchExecute";

/// The subsystem answering unqualified command types.
#[derive(Debug, Default)]
pub struct CoreSubsystem {
    cell: LifecycleCell,
    bridge: Option<BridgeContext>,
}

impl CoreSubsystem {
    /// Creates an uninitialised core subsystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Lifecycle for CoreSubsystem {
    fn name(&self) -> &str {
        DEFAULT_SUBSYSTEM
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn state(&self) -> LifecycleState {
        self.cell.state()
    }

    fn initialize(&mut self, context: &BridgeContext) -> Result<(), InitializationError> {
        self.cell.advance(DEFAULT_SUBSYSTEM, LifecycleState::Initialized)?;
        self.bridge = Some(context.clone());
        Ok(())
    }

    fn shutdown(&mut self) {
        self.cell.shut_down();
        self.bridge = None;
    }

    fn as_command_provider(&self) -> Option<&dyn CommandProvider> {
        Some(self)
    }
}

impl CommandProvider for CoreSubsystem {
    fn command_handlers(&self) -> HandlerTable {
        let bridge = self.bridge.clone();
        let mut table = HandlerTable::new();
        table.insert("Ping".to_owned(), handler(ping));
        table.insert(
            "GetSystemInfo".to_owned(),
            handler(move |context: &CommandContext<'_>, _| Ok(system_info(context, bridge.as_ref()))),
        );
        table.insert("ListCommands".to_owned(), handler(list_commands));
        table.insert("GetCommandMetrics".to_owned(), handler(command_metrics));
        table.insert(BATCH_EXECUTE.to_owned(), handler(batch_execute));
        table.insert("GetErrorLogs".to_owned(), handler(get_error_logs));
        table.insert("GetErrorDetails".to_owned(), handler(get_error_details));
        table.insert("ClearErrorLogs".to_owned(), handler(clear_error_logs));
        table.insert("AsyncExecute".to_owned(), handler(async_execute));
        table.insert("GetAsyncStatus".to_owned(), handler(get_async_status));
        table.insert(
            "CancelAsyncOperation".to_owned(),
            handler(cancel_async_operation),
        );
        table.insert(
            "ListAsyncOperations".to_owned(),
            handler(list_async_operations),
        );
        table
    }
}

fn ping(context: &CommandContext<'_>, _parameters: Value) -> HandlerResult {
    Ok(json!({ "pong": true, "tick": context.tick() }))
}

fn system_info(context: &CommandContext<'_>, bridge: Option<&BridgeContext>) -> Value {
    let registry = context.registry();
    json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": bridge.map_or(env!("CARGO_PKG_VERSION"), BridgeContext::bridge_version),
        "endpoint": bridge.map(|details| details.endpoint().to_string()),
        "localAddress": bridge
            .and_then(BridgeContext::local_addr)
            .as_ref()
            .map(ToString::to_string),
        "maxRequestBytes": bridge.map(BridgeContext::max_request_bytes),
        "subsystemCount": registry.subsystems().count(),
        "commandCount": registry.len(),
        "tick": context.tick(),
    })
}

fn list_commands(context: &CommandContext<'_>, _parameters: Value) -> HandlerResult {
    let commands = context.registry().commands();
    Ok(json!({ "count": commands.len(), "commands": commands }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetricsQuery {
    command: Option<String>,
}

fn command_metrics(context: &CommandContext<'_>, parameters: Value) -> HandlerResult {
    let query: MetricsQuery = serde_json::from_value(parameters)?;
    let metrics = context.metrics();
    let Some(command) = query.command else {
        return Ok(json!({ "metrics": metrics.to_json() }));
    };
    let stats = metrics
        .get(&command)
        .ok_or_else(|| HandlerFault::new(format!("No metrics recorded for '{command}'")))?;
    Ok(json!({ "command": command, "metrics": stats }))
}
