//! Two-level command routing table.
//!
//! Commands are addressed as `subsystem.action`. Subsystem names are matched
//! case-insensitively (they are stored lowercased); action names are matched
//! exactly. Registering an action that already exists replaces the previous
//! handler and hands it back to the caller.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::envelope::DEFAULT_SUBSYSTEM;
use crate::executor::CommandContext;

/// Result type returned by command handlers.
pub type HandlerResult = Result<Value, HandlerFault>;

/// Shared, type-erased command handler.
pub type Handler = Arc<dyn CommandHandler>;

/// A function that executes one command on the host thread.
pub trait CommandHandler: Send + Sync {
    /// Executes the command with its decoded parameters.
    fn call(&self, context: &CommandContext<'_>, parameters: Value) -> HandlerResult;
}

impl<F> CommandHandler for F
where
    F: Fn(&CommandContext<'_>, Value) -> HandlerResult + Send + Sync,
{
    fn call(&self, context: &CommandContext<'_>, parameters: Value) -> HandlerResult {
        self(context, parameters)
    }
}

/// Wraps a closure that needs the dispatch context.
#[must_use]
pub fn handler<F>(function: F) -> Handler
where
    F: Fn(&CommandContext<'_>, Value) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(function)
}

/// Wraps a closure that only needs the command parameters.
#[must_use]
pub fn simple_handler<F>(function: F) -> Handler
where
    F: Fn(Value) -> HandlerResult + Send + Sync + 'static,
{
    handler(move |_context: &CommandContext<'_>, parameters: Value| function(parameters))
}

/// Failure reported by a handler, or a panic caught at the executor boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerFault {
    message: String,
}

impl HandlerFault {
    /// Creates a fault with the given description.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Creates a fault for a missing or mistyped parameter.
    #[must_use]
    pub fn invalid_parameter(name: &str, expected: &str) -> Self {
        Self::new(format!("parameter '{name}' must be {expected}"))
    }

    /// Fault description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<serde_json::Error> for HandlerFault {
    fn from(error: serde_json::Error) -> Self {
        Self::new(format!("invalid parameters: {error}"))
    }
}

/// Errors raised while resolving a command identifier to a handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// Identifier has an empty subsystem or action half.
    #[error("Invalid command type '{identifier}': expected 'subsystem.action' or 'action'")]
    MalformedIdentifier {
        /// Identifier as received.
        identifier: String,
    },
    /// No subsystem with that name is registered.
    #[error("Unknown subsystem: {subsystem}")]
    UnknownSubsystem {
        /// Normalised subsystem name.
        subsystem: String,
    },
    /// The subsystem exists but does not expose the action.
    #[error("Unknown command '{action}' in subsystem '{subsystem}'")]
    UnknownAction {
        /// Normalised subsystem name.
        subsystem: String,
        /// Action as received.
        action: String,
    },
}

/// A command identifier split into its routing halves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandIdentifier {
    subsystem: String,
    action: String,
}

impl CommandIdentifier {
    /// Splits `subsystem.action` on the first dot.
    ///
    /// An identifier without a dot addresses [`DEFAULT_SUBSYSTEM`]. The
    /// subsystem half is lowercased; the action half is kept verbatim, so
    /// `Scene.Load.Async` routes to subsystem `scene`, action `Load.Async`.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::MalformedIdentifier`] when either half is empty.
    pub fn parse(raw: &str) -> Result<Self, RoutingError> {
        let trimmed = raw.trim();
        let (prefix, suffix) = trimmed
            .split_once('.')
            .unwrap_or((DEFAULT_SUBSYSTEM, trimmed));
        let subsystem = prefix.trim();
        let action = suffix.trim();
        if subsystem.is_empty() || action.is_empty() {
            return Err(RoutingError::MalformedIdentifier {
                identifier: trimmed.to_owned(),
            });
        }
        Ok(Self {
            subsystem: normalise_subsystem(subsystem),
            action: action.to_owned(),
        })
    }

    /// Lowercased subsystem name.
    #[must_use]
    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    /// Action name.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }
}

impl fmt::Display for CommandIdentifier {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}.{}", self.subsystem, self.action)
    }
}

/// Canonical form of a subsystem name used as the registry key.
#[must_use]
pub fn normalise_subsystem(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Maps `(subsystem, action)` pairs to handlers.
///
/// The registry is owned by the executor and mutated only through `&mut`
/// access on the host thread, so registration cannot overlap dispatch.
#[derive(Default)]
pub struct HandlerRegistry {
    subsystems: BTreeMap<String, BTreeMap<String, Handler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, returning the handler it replaced, if any.
    pub fn register(
        &mut self,
        subsystem: &str,
        action: impl Into<String>,
        handler: Handler,
    ) -> Option<Handler> {
        self.subsystems
            .entry(normalise_subsystem(subsystem))
            .or_default()
            .insert(action.into(), handler)
    }

    /// Removes every action registered for `subsystem`, returning how many
    /// were removed.
    pub fn unregister(&mut self, subsystem: &str) -> usize {
        self.subsystems
            .remove(&normalise_subsystem(subsystem))
            .map_or(0, |actions| actions.len())
    }

    /// Looks up the handler for a `(subsystem, action)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::UnknownSubsystem`] or
    /// [`RoutingError::UnknownAction`] when nothing matches.
    pub fn resolve(&self, subsystem: &str, action: &str) -> Result<&Handler, RoutingError> {
        let key = normalise_subsystem(subsystem);
        let Some(actions) = self.subsystems.get(&key) else {
            return Err(RoutingError::UnknownSubsystem { subsystem: key });
        };
        actions.get(action).ok_or_else(|| RoutingError::UnknownAction {
            subsystem: key,
            action: action.to_owned(),
        })
    }

    /// Resolves a parsed identifier.
    ///
    /// # Errors
    ///
    /// See [`HandlerRegistry::resolve`].
    pub fn resolve_identifier(
        &self,
        identifier: &CommandIdentifier,
    ) -> Result<&Handler, RoutingError> {
        self.resolve(identifier.subsystem(), identifier.action())
    }

    /// Returns true when any action is registered under `subsystem`.
    #[must_use]
    pub fn contains_subsystem(&self, subsystem: &str) -> bool {
        self.subsystems
            .contains_key(&normalise_subsystem(subsystem))
    }

    /// Registered subsystem names in sorted order.
    pub fn subsystems(&self) -> impl Iterator<Item = &str> {
        self.subsystems.keys().map(String::as_str)
    }

    /// Every registered command as `subsystem.action`, sorted.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.subsystems
            .iter()
            .flat_map(|(subsystem, actions)| {
                actions
                    .keys()
                    .map(move |action| format!("{subsystem}.{action}"))
            })
            .collect()
    }

    /// Total number of registered commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subsystems.values().map(BTreeMap::len).sum()
    }

    /// Returns true when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subsystems.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HandlerRegistry")
            .field("commands", &self.commands())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::expect_used, reason = "tests fail loudly on setup errors")]

    use super::*;
    use crate::executor::{CommandJournal, CommandMetrics};
    use rstest::{fixture, rstest};
    use serde_json::json;

    fn constant(value: Value) -> Handler {
        simple_handler(move |_| Ok(value.clone()))
    }

    fn invoke(handler: &Handler, registry: &HandlerRegistry) -> Value {
        let metrics = CommandMetrics::default();
        let journal = CommandJournal::new();
        let context = CommandContext::new(registry, &metrics, &journal, 0);
        handler.call(&context, json!({})).expect("handler succeeds")
    }

    #[fixture]
    fn registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register("Scene", "CreateObject", constant(json!("created")));
        registry.register("scene", "DeleteObject", constant(json!("deleted")));
        registry.register("core", "Ping", constant(json!("pong")));
        registry
    }

    #[rstest]
    #[case::qualified("scene.CreateObject", "scene", "CreateObject")]
    #[case::upper_subsystem("SCENE.CreateObject", "scene", "CreateObject")]
    #[case::default_subsystem("Ping", "core", "Ping")]
    #[case::extra_dots("scene.Load.Async", "scene", "Load.Async")]
    fn identifier_splits_on_first_dot(
        #[case] raw: &str,
        #[case] subsystem: &str,
        #[case] action: &str,
    ) {
        let identifier = CommandIdentifier::parse(raw).expect("parse identifier");
        assert_eq!(identifier.subsystem(), subsystem);
        assert_eq!(identifier.action(), action);
    }

    #[rstest]
    #[case::leading_dot(".Ping")]
    #[case::trailing_dot("scene.")]
    #[case::only_dot(".")]
    fn malformed_identifiers_are_routing_errors(#[case] raw: &str) {
        let error = CommandIdentifier::parse(raw).expect_err("parse must fail");
        assert!(matches!(error, RoutingError::MalformedIdentifier { .. }));
    }

    #[rstest]
    #[case::lower("scene")]
    #[case::upper("SCENE")]
    #[case::mixed("ScEnE")]
    fn subsystem_lookup_ignores_case(registry: HandlerRegistry, #[case] subsystem: &str) {
        let handler = registry
            .resolve(subsystem, "CreateObject")
            .expect("resolve handler");
        assert_eq!(invoke(handler, &registry), json!("created"));
    }

    #[rstest]
    fn action_lookup_respects_case(registry: HandlerRegistry) {
        let error = registry
            .resolve("scene", "createobject")
            .err()
            .expect("action case must matter");
        assert_eq!(
            error,
            RoutingError::UnknownAction {
                subsystem: "scene".to_owned(),
                action: "createobject".to_owned(),
            }
        );
    }

    #[rstest]
    fn unknown_subsystem_and_action_have_distinct_messages(registry: HandlerRegistry) {
        let subsystem_error = registry
            .resolve("lighting", "Bake")
            .err()
            .expect("unknown subsystem");
        let action_error = registry
            .resolve("scene", "Bake")
            .err()
            .expect("unknown action");
        assert_eq!(subsystem_error.to_string(), "Unknown subsystem: lighting");
        assert_eq!(
            action_error.to_string(),
            "Unknown command 'Bake' in subsystem 'scene'"
        );
    }

    #[rstest]
    fn last_registration_wins_and_returns_previous(mut registry: HandlerRegistry) {
        let previous = registry
            .register("SCENE", "CreateObject", constant(json!("replaced")))
            .expect("previous handler returned");
        assert_eq!(invoke(&previous, &registry), json!("created"));

        let current = registry
            .resolve("scene", "CreateObject")
            .expect("resolve replacement");
        assert_eq!(invoke(current, &registry), json!("replaced"));
        assert_eq!(registry.len(), 3);
    }

    #[rstest]
    fn unregister_removes_all_actions(mut registry: HandlerRegistry) {
        assert_eq!(registry.unregister("Scene"), 2);
        assert!(!registry.contains_subsystem("scene"));
        assert!(registry.resolve("scene", "DeleteObject").is_err());
        assert_eq!(registry.unregister("scene"), 0);
        assert_eq!(registry.commands(), vec!["core.Ping".to_owned()]);
    }

    #[rstest]
    fn commands_are_listed_in_sorted_order(registry: HandlerRegistry) {
        assert_eq!(
            registry.commands(),
            vec![
                "core.Ping".to_owned(),
                "scene.CreateObject".to_owned(),
                "scene.DeleteObject".to_owned(),
            ]
        );
        assert_eq!(registry.subsystems().collect::<Vec<_>>(), vec!["core", "scene"]);
    }
}
