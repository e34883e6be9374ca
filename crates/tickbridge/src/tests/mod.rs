//! Cross-module test suites for the bridge.

pub(crate) mod support;
