//! Per-command execution statistics.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

/// Running totals for one command.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandStats {
    /// Number of invocations.
    pub call_count: u64,
    /// Invocations that produced an error envelope.
    pub error_count: u64,
    /// Cumulative execution time in seconds.
    pub total_execution_time: f64,
    /// Mean execution time in seconds.
    pub average_execution_time: f64,
    /// Tick of the most recent invocation.
    pub last_tick: u64,
    #[serde(skip)]
    total: Duration,
}

impl CommandStats {
    /// Mean execution time.
    #[must_use]
    pub fn average(&self) -> Duration {
        let nanos = self
            .total
            .as_nanos()
            .checked_div(u128::from(self.call_count))
            .unwrap_or(0);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Statistics keyed by canonical `subsystem.action`.
#[derive(Debug, Clone, Default)]
pub struct CommandMetrics {
    entries: BTreeMap<String, CommandStats>,
}

impl CommandMetrics {
    /// Records one invocation.
    pub fn record(&mut self, command: &str, elapsed: Duration, failed: bool, tick: u64) {
        let stats = self.entries.entry(command.to_owned()).or_default();
        stats.call_count = stats.call_count.saturating_add(1);
        if failed {
            stats.error_count = stats.error_count.saturating_add(1);
        }
        stats.total = stats.total.saturating_add(elapsed);
        stats.total_execution_time = stats.total.as_secs_f64();
        stats.average_execution_time = stats.average().as_secs_f64();
        stats.last_tick = tick;
    }

    /// Statistics for one command.
    #[must_use]
    pub fn get(&self, command: &str) -> Option<&CommandStats> {
        self.entries.get(command)
    }

    /// All statistics in command order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CommandStats)> {
        self.entries.iter().map(|(name, stats)| (name.as_str(), stats))
    }

    /// Serialises the table as a JSON object keyed by command.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.entries).unwrap_or_default()
    }

    /// Clears every entry.
    pub fn reset(&mut self) {
        self.entries.clear();
    }
}
