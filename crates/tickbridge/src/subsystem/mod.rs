//! Subsystem lifecycle management.
//!
//! A subsystem is a named, versioned unit the host plugs into the bridge. It
//! always has a lifecycle ([`Lifecycle`]) and may additionally expose command
//! handlers ([`CommandProvider`]). The [`SubsystemManager`] initialises
//! subsystems, pulls their handlers into the registry and shuts them down in
//! reverse registration order.

mod context;
mod errors;
mod lifecycle;
mod manager;

pub use self::context::BridgeContext;
pub use self::errors::{InitializationError, SubsystemError};
pub use self::lifecycle::{CommandProvider, HandlerTable, Lifecycle, LifecycleCell, LifecycleState};
pub use self::manager::SubsystemManager;

/// Tracing target for subsystem lifecycle events.
pub(crate) const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");
