//! Capability traits implemented by subsystems.

use std::collections::BTreeMap;
use std::fmt;

use crate::registry::Handler;

use super::{BridgeContext, InitializationError, SubsystemError};

/// Handlers exposed by a subsystem, keyed by action name.
pub type HandlerTable = BTreeMap<String, Handler>;

/// Lifecycle position of a subsystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Constructed but not yet initialised.
    #[default]
    Uninitialized,
    /// Initialised and serving commands.
    Initialized,
    /// Shut down; cannot be initialised again.
    Shutdown,
}

impl LifecycleState {
    /// Returns true when moving from `self` to `next` is allowed.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Uninitialized, Self::Initialized) | (Self::Initialized, Self::Shutdown)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Shutdown => "shutdown",
        };
        formatter.write_str(label)
    }
}

/// A named, versioned unit managed by the bridge.
pub trait Lifecycle: Send {
    /// Routing name. Matched case-insensitively.
    fn name(&self) -> &str;

    /// Version string reported by introspection commands.
    fn version(&self) -> &str;

    /// Current lifecycle state.
    fn state(&self) -> LifecycleState;

    /// Returns true while the subsystem is initialised.
    fn is_initialized(&self) -> bool {
        self.state() == LifecycleState::Initialized
    }

    /// Prepares the subsystem. Called once, before its handlers are
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns the subsystem's own error; the manager then registers nothing.
    fn initialize(&mut self, context: &BridgeContext) -> Result<(), InitializationError>;

    /// Releases the subsystem's resources. Called once, after its handlers
    /// were removed from the registry.
    fn shutdown(&mut self);

    /// Exposes the handler capability, when the subsystem has one.
    fn as_command_provider(&self) -> Option<&dyn CommandProvider> {
        None
    }
}

/// Optional capability: subsystems that expose command handlers.
pub trait CommandProvider {
    /// Handlers to register under the subsystem's name.
    fn command_handlers(&self) -> HandlerTable;
}

/// State tracker enforcing the one-way lifecycle for subsystem
/// implementations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleCell {
    state: LifecycleState,
}

impl LifecycleCell {
    /// Creates a cell in the uninitialised state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: LifecycleState::Uninitialized,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`SubsystemError::InvalidTransition`] for anything other than
    /// uninitialised to initialised or initialised to shutdown.
    pub fn advance(&mut self, name: &str, next: LifecycleState) -> Result<(), SubsystemError> {
        if !self.state.can_advance_to(next) {
            return Err(SubsystemError::InvalidTransition {
                name: name.to_owned(),
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Moves to shutdown if initialised. Returns false when there was nothing
    /// to shut down.
    pub fn shut_down(&mut self) -> bool {
        if self.state == LifecycleState::Initialized {
            self.state = LifecycleState::Shutdown;
            true
        } else {
            false
        }
    }
}
