//! Error types for subsystem registration.

use thiserror::Error;

use super::LifecycleState;

/// Error raised by a subsystem's own initialisation hook.
pub type InitializationError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned to the host while registering subsystems.
#[derive(Debug, Error)]
pub enum SubsystemError {
    /// The name is empty or contains the `.` separator.
    #[error("invalid subsystem name {name:?}: names must be non-empty and must not contain '.'")]
    InvalidName {
        /// Offending name.
        name: String,
    },
    /// A subsystem with the same name (ignoring case) is already registered.
    #[error("subsystem '{name}' is already registered")]
    DuplicateName {
        /// Rejected name.
        name: String,
    },
    /// The requested lifecycle transition is not allowed.
    #[error("subsystem '{name}' cannot move from {from} to {to}")]
    InvalidTransition {
        /// Subsystem name.
        name: String,
        /// Current state.
        from: LifecycleState,
        /// Requested state.
        to: LifecycleState,
    },
    /// The subsystem's initialisation hook failed.
    #[error("subsystem '{name}' failed to initialise: {source}")]
    Initialization {
        /// Subsystem name.
        name: String,
        /// Error reported by the subsystem.
        #[source]
        source: InitializationError,
    },
}
