//! # Circuit Breaker Manager
//!
//! One breaker per activity name, created lazily on first use.

use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, SystemCircuitBreakerMetrics};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug)]
pub struct CircuitBreakerManager {
    circuit_breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerManager {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        if config.enabled {
            info!(
                failure_threshold = config.defaults.failure_threshold,
                overrides = config.activity_overrides.len(),
                "Initializing activity circuit breakers"
            );
        }
        Self {
            circuit_breakers: DashMap::new(),
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Breaker for `activity`, or `None` when breakers are disabled
    pub fn breaker_for(&self, activity: &str) -> Option<Arc<CircuitBreaker>> {
        if !self.config.enabled {
            return None;
        }
        if let Some(existing) = self.circuit_breakers.get(activity) {
            return Some(Arc::clone(existing.value()));
        }
        let breaker = self
            .circuit_breakers
            .entry(activity.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    activity,
                    self.config.thresholds_for(activity).clone(),
                ))
            })
            .value()
            .clone();
        Some(breaker)
    }

    pub fn list_activities(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .circuit_breakers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub async fn system_metrics(&self) -> SystemCircuitBreakerMetrics {
        let breakers: Vec<(String, Arc<CircuitBreaker>)> = self
            .circuit_breakers
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let metrics = join_all(breakers.iter().map(|(_, breaker)| breaker.metrics())).await;

        let mut system = SystemCircuitBreakerMetrics::new();
        for ((name, _), metrics) in breakers.into_iter().zip(metrics) {
            system.add_circuit_breaker(name, metrics);
        }
        system
    }

    /// Close every breaker, e.g. after an outage has been resolved by hand
    pub async fn force_close_all(&self) {
        warn!("🚨 Forcing all activity circuit breakers closed");
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .circuit_breakers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for breaker in breakers {
            breaker.force_closed().await;
        }
    }
}
