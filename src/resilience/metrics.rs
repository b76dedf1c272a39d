//! # Circuit Breaker Metrics
//!
//! Counters kept by each breaker, plus an aggregate snapshot across activities.

use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Counters for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Calls rejected without invoking the activity
    pub rejected_count: u64,
    pub consecutive_failures: u64,
    /// Trial calls admitted while half-open
    pub half_open_calls: u64,
    pub total_duration: Duration,
    pub current_state: CircuitState,
    pub failure_rate: f64,
}

impl CircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            rejected_count: 0,
            consecutive_failures: 0,
            half_open_calls: 0,
            total_duration: Duration::ZERO,
            current_state: CircuitState::Closed,
            failure_rate: 0.0,
        }
    }

    pub fn is_healthy(&self) -> bool {
        match self.current_state {
            CircuitState::Closed => self.failure_rate < 0.1,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "State: {:?} | Calls: {} | Failures: {} | Rejected: {}",
            self.current_state, self.total_calls, self.failure_count, self.rejected_count
        )
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of every activity breaker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemCircuitBreakerMetrics {
    pub circuit_breakers: HashMap<String, CircuitBreakerMetrics>,
}

impl SystemCircuitBreakerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_circuit_breaker(&mut self, name: String, metrics: CircuitBreakerMetrics) {
        self.circuit_breakers.insert(name, metrics);
    }

    /// Names of activities whose circuit is currently open
    pub fn open_circuits(&self) -> Vec<&str> {
        let mut open: Vec<&str> = self
            .circuit_breakers
            .iter()
            .filter(|(_, metrics)| metrics.current_state == CircuitState::Open)
            .map(|(name, _)| name.as_str())
            .collect();
        open.sort_unstable();
        open
    }

    /// Fraction of healthy breakers, 1.0 when there are none
    pub fn health_score(&self) -> f64 {
        if self.circuit_breakers.is_empty() {
            return 1.0;
        }
        let healthy = self
            .circuit_breakers
            .values()
            .filter(|metrics| metrics.is_healthy())
            .count();
        healthy as f64 / self.circuit_breakers.len() as f64
    }
}
