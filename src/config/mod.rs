//! # Engine Configuration
//!
//! Tunables for the orchestration engine, loaded in layers by [`ConfigManager`]:
//!
//! 1. `config/workflow.toml` (base)
//! 2. `config/{environment}.toml` (overrides)
//! 3. `WORKFLOW__SECTION__KEY` environment variables
//!
//! Every field has a default, so an empty configuration directory is valid.
//!
//! ```rust,no_run
//! use workflow_orchestrator::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let budget = manager.config().step_budget;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::orchestration::retry_policy::RetryPolicyConfig;
use crate::resilience::CircuitBreakerConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Node evaluations allowed over a run's lifetime before it fails
    pub step_budget: u64,
    /// Node evaluations per tick before the tick yields to the dispatcher
    pub max_steps_per_tick: u32,
    /// Activity timeout when the node sets none
    pub default_step_timeout_ms: u64,
    /// Attempts at a cancel before giving up on version conflicts
    pub conflict_retry_limit: u32,
    pub retry: RetryPolicyConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub events: EventsConfig,
    pub worker: WorkerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_budget: 10_000,
            max_steps_per_tick: 100,
            default_step_timeout_ms: 30_000,
            conflict_retry_limit: 3,
            retry: RetryPolicyConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            events: EventsConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub max_concurrent_ticks: usize,
    /// Capacity of the dispatcher's continuation channel
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_ticks: 16,
            queue_capacity: 1_024,
        }
    }
}

impl EngineConfig {
    pub fn default_step_timeout(&self) -> Duration {
        Duration::from_millis(self.default_step_timeout_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.step_budget == 0 {
            return Err(ConfigurationError::invalid_value(
                "step_budget",
                0,
                "step budget must be greater than 0",
            ));
        }

        if self.max_steps_per_tick == 0 {
            return Err(ConfigurationError::invalid_value(
                "max_steps_per_tick",
                0,
                "a tick must be allowed to evaluate at least one node",
            ));
        }

        if self.default_step_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "default_step_timeout_ms",
                0,
                "step timeout must be greater than 0",
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.max_attempts",
                0,
                "max_attempts counts the first attempt and must be at least 1",
            ));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "retry.base_delay_ms",
                self.retry.base_delay_ms,
                format!("must not exceed retry.max_delay_ms ({})", self.retry.max_delay_ms),
            ));
        }

        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "retry.multiplier",
                self.retry.multiplier,
                "multiplier must be at least 1.0",
            ));
        }

        if self.circuit_breaker.enabled {
            self.circuit_breaker
                .validate()
                .map_err(|reason| ConfigurationError::invalid_value("circuit_breaker", "", reason))?;
        }

        if self.events.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.channel_capacity",
                0,
                "channel capacity must be greater than 0",
            ));
        }

        if self.worker.max_concurrent_ticks == 0 || self.worker.queue_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker",
                self.worker.max_concurrent_ticks,
                "worker concurrency and queue capacity must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.step_budget, 10_000);
        assert_eq!(config.max_steps_per_tick, 100);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_rejects_zero_budgets() {
        let config = EngineConfig {
            step_budget: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { ref field, .. }) if field == "step_budget"
        ));

        let mut config = EngineConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_delays_and_shrinking_backoff() {
        let mut config = EngineConfig::default();
        config.retry.base_delay_ms = 10_000;
        config.retry.max_delay_ms = 1_000;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.retry.multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_breaker_thresholds_only_checked_when_enabled() {
        let mut config = EngineConfig::default();
        config.circuit_breaker.defaults.failure_threshold = 0;
        assert!(config.validate().is_ok());

        config.circuit_breaker.enabled = true;
        assert!(config.validate().is_err());
    }
}
