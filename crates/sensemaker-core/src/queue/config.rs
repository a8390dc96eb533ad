use super::redis_store::DEFAULT_COLLECTION;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lowest accepted tick frequency
const MIN_FREQUENCY_HZ: f64 = 0.001;

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_frequency_hz() -> f64 {
    1.0
}

fn default_history_limit() -> usize {
    1000
}

/// Configuration for the job queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Name of the durable list
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Tick frequency in Hz
    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: f64,
    /// Per-tick handler budget in milliseconds; defaults to the tick interval
    #[serde(default)]
    pub tick_budget_ms: Option<u64>,
    /// Retries granted to submitted jobs that carry none of their own
    #[serde(default)]
    pub attempts: u32,
    /// Settled jobs kept for lookup; older ones are forgotten first
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            frequency_hz: default_frequency_hz(),
            tick_budget_ms: None,
            attempts: 0,
            history_limit: default_history_limit(),
        }
    }
}

impl QueueConfig {
    /// Set the tick frequency
    #[must_use]
    pub fn with_frequency(mut self, hz: f64) -> Self {
        self.frequency_hz = hz;
        self
    }

    /// Set the per-tick budget
    #[must_use]
    pub fn with_tick_budget(mut self, budget: Duration) -> Self {
        self.tick_budget_ms = Some(budget.as_millis() as u64);
        self
    }

    /// Set how many settled jobs stay queryable
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Time between ticks
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frequency_hz.max(MIN_FREQUENCY_HZ))
    }

    /// How long a handler may run before the job fails
    #[must_use]
    pub fn tick_budget(&self) -> Duration {
        self.tick_budget_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.interval())
    }
}
