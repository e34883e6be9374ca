//! Registration and ordered shutdown of subsystems.

use std::fmt;

use tracing::{info, warn};

use crate::registry::{HandlerRegistry, normalise_subsystem};

use super::{BridgeContext, LIFECYCLE_TARGET, Lifecycle, LifecycleState, SubsystemError};

struct Entry {
    key: String,
    subsystem: Box<dyn Lifecycle>,
}

/// Owns registered subsystems in registration order.
#[derive(Default)]
pub struct SubsystemManager {
    entries: Vec<Entry>,
}

impl SubsystemManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialises `subsystem` and registers its handlers under its name.
    ///
    /// Names are validated and checked for duplicates (ignoring case) before
    /// the subsystem is touched. Handlers are only pulled in after a
    /// successful initialisation, so a failure leaves the registry unchanged.
    /// Returns the number of handlers registered.
    ///
    /// # Errors
    ///
    /// Returns a [`SubsystemError`] for an invalid or duplicate name, a
    /// subsystem that is not uninitialised, or a failed initialisation.
    pub fn register(
        &mut self,
        mut subsystem: Box<dyn Lifecycle>,
        registry: &mut HandlerRegistry,
        context: &BridgeContext,
    ) -> Result<usize, SubsystemError> {
        let name = subsystem.name().trim().to_owned();
        if name.is_empty() || name.contains('.') {
            return Err(SubsystemError::InvalidName { name });
        }
        let key = normalise_subsystem(&name);
        if self.entries.iter().any(|entry| entry.key == key) {
            warn!(target: LIFECYCLE_TARGET, subsystem = %name, "duplicate subsystem rejected");
            return Err(SubsystemError::DuplicateName { name });
        }
        let state = subsystem.state();
        if !state.can_advance_to(LifecycleState::Initialized) {
            return Err(SubsystemError::InvalidTransition {
                name,
                from: state,
                to: LifecycleState::Initialized,
            });
        }

        if let Err(source) = subsystem.initialize(context) {
            warn!(
                target: LIFECYCLE_TARGET,
                subsystem = %name,
                error = %source,
                "subsystem initialisation failed"
            );
            return Err(SubsystemError::Initialization { name, source });
        }

        let handlers = subsystem
            .as_command_provider()
            .map(|provider| provider.command_handlers())
            .unwrap_or_default();
        let registered = handlers.len();
        for (action, handler) in handlers {
            if registry.register(&key, action.as_str(), handler).is_some() {
                warn!(
                    target: LIFECYCLE_TARGET,
                    subsystem = %name,
                    action = %action,
                    "handler replaced an existing registration"
                );
            }
        }

        info!(
            target: LIFECYCLE_TARGET,
            subsystem = %name,
            version = subsystem.version(),
            handlers = registered,
            "subsystem registered"
        );
        self.entries.push(Entry { key, subsystem });
        Ok(registered)
    }

    /// Unregisters and shuts down every subsystem, newest first. Returns how
    /// many subsystems were shut down.
    pub fn shutdown_all(&mut self, registry: &mut HandlerRegistry) -> usize {
        let mut count = 0;
        while let Some(Entry { key, mut subsystem }) = self.entries.pop() {
            let removed = registry.unregister(&key);
            if subsystem.is_initialized() {
                subsystem.shutdown();
            }
            info!(
                target: LIFECYCLE_TARGET,
                subsystem = subsystem.name(),
                handlers = removed,
                "subsystem shut down"
            );
            count += 1;
        }
        count
    }

    /// Looks up a subsystem by name, ignoring case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Lifecycle> {
        let key = normalise_subsystem(name);
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.subsystem.as_ref())
    }

    /// Subsystem names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.subsystem.name())
    }

    /// Number of registered subsystems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no subsystem is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for SubsystemManager {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_list()
            .entries(self.entries.iter().map(|entry| {
                (entry.subsystem.name(), entry.subsystem.version(), entry.subsystem.state())
            }))
            .finish()
    }
}
