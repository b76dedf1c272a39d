//! # Circuit Breaker Configuration
//!
//! Settings for the per-activity circuit breakers. Every activity gets the
//! default thresholds unless `activity_overrides` names it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Thresholds for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerThresholds {
    /// Consecutive transient failures before the circuit opens
    pub failure_threshold: u32,
    /// Time spent open before a trial call is let through
    pub timeout_ms: u64,
    /// Successful trial calls needed to close the circuit again
    pub success_threshold: u32,
}

impl BreakerThresholds {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }
        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be greater than 0".to_string());
        }
        if self.timeout_ms > 300_000 {
            return Err("timeout_ms should not exceed 300000".to_string());
        }
        if self.success_threshold == 0 {
            return Err("success_threshold must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Default for BreakerThresholds {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_ms: 30_000,
            success_threshold: 2,
        }
    }
}

/// Engine-wide circuit breaker settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// When false, activities are invoked without a breaker
    pub enabled: bool,
    pub defaults: BreakerThresholds,
    /// Per-activity thresholds, keyed by activity name
    pub activity_overrides: HashMap<String, BreakerThresholds>,
}

impl CircuitBreakerConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    pub fn thresholds_for(&self, activity: &str) -> &BreakerThresholds {
        self.activity_overrides.get(activity).unwrap_or(&self.defaults)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.defaults.validate()?;
        for (activity, thresholds) in &self.activity_overrides {
            thresholds
                .validate()
                .map_err(|reason| format!("activity_overrides.{activity}: {reason}"))?;
        }
        Ok(())
    }
}
