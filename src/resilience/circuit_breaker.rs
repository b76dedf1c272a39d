//! # Circuit Breaker
//!
//! Isolates an activity that keeps failing transiently. Three states: Closed
//! (calls pass), Open (calls are rejected without invoking the activity) and
//! HalfOpen (a limited number of trial calls test recovery).
//!
//! Only transient failures count against the circuit. A permanent failure is a
//! business outcome of the activity, not a sign the dependency is unhealthy.

use crate::resilience::{BreakerThresholds, CircuitBreakerMetrics};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

#[derive(Debug)]
struct BreakerState {
    metrics: CircuitBreakerMetrics,
    opened_at: Option<Instant>,
    half_open_successes: u64,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    state: AtomicU8,
    thresholds: BreakerThresholds,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, thresholds: BreakerThresholds) -> Self {
        let name = name.into();
        debug!(
            component = %name,
            failure_threshold = thresholds.failure_threshold,
            timeout_ms = thresholds.timeout_ms,
            success_threshold = thresholds.success_threshold,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            thresholds,
            inner: Mutex::new(BreakerState {
                metrics: CircuitBreakerMetrics::new(),
                opened_at: None,
                half_open_successes: 0,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `operation` under the breaker. `Err` outcomes count as failures.
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.admit().await {
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            });
        }

        let started = Instant::now();
        let result = operation().await;
        let elapsed = started.elapsed();

        match &result {
            Ok(_) => self.record_success(elapsed).await,
            Err(_) => self.record_failure(elapsed).await,
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    async fn admit(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|at| at.elapsed());
                match elapsed {
                    Some(elapsed) if elapsed >= self.thresholds.timeout() => {
                        self.set_state(CircuitState::HalfOpen);
                        inner.metrics.half_open_calls = 1;
                        info!(
                            component = %self.name,
                            success_threshold = self.thresholds.success_threshold,
                            "🟡 Circuit breaker half-open (testing recovery)"
                        );
                        true
                    }
                    Some(_) => {
                        inner.metrics.rejected_count += 1;
                        false
                    }
                    None => {
                        warn!(component = %self.name, "Circuit open but no timestamp recorded");
                        true
                    }
                }
            }
            CircuitState::HalfOpen => {
                if inner.metrics.half_open_calls < u64::from(self.thresholds.success_threshold) {
                    inner.metrics.half_open_calls += 1;
                    true
                } else {
                    inner.metrics.rejected_count += 1;
                    false
                }
            }
        }
    }

    async fn record_success(&self, duration: Duration) {
        let mut inner = self.inner.lock().await;
        inner.metrics.total_calls += 1;
        inner.metrics.success_count += 1;
        inner.metrics.total_duration += duration;
        inner.metrics.consecutive_failures = 0;

        if self.state() == CircuitState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes >= u64::from(self.thresholds.success_threshold) {
                self.close(&mut inner);
            }
        }
    }

    async fn record_failure(&self, duration: Duration) {
        let mut inner = self.inner.lock().await;
        inner.metrics.total_calls += 1;
        inner.metrics.failure_count += 1;
        inner.metrics.total_duration += duration;
        inner.metrics.consecutive_failures += 1;

        debug!(
            component = %self.name,
            consecutive_failures = inner.metrics.consecutive_failures,
            "🔴 Protected call failed"
        );

        match self.state() {
            CircuitState::Closed
                if inner.metrics.consecutive_failures
                    >= u64::from(self.thresholds.failure_threshold) =>
            {
                self.open(&mut inner);
            }
            CircuitState::HalfOpen => self.open(&mut inner),
            _ => {}
        }
    }

    fn open(&self, inner: &mut BreakerState) {
        self.set_state(CircuitState::Open);
        inner.opened_at = Some(Instant::now());
        inner.metrics.half_open_calls = 0;
        inner.half_open_successes = 0;
        warn!(
            component = %self.name,
            consecutive_failures = inner.metrics.consecutive_failures,
            timeout_ms = self.thresholds.timeout_ms,
            "🔴 Circuit breaker opened (failing fast)"
        );
    }

    fn close(&self, inner: &mut BreakerState) {
        self.set_state(CircuitState::Closed);
        inner.opened_at = None;
        inner.metrics.half_open_calls = 0;
        inner.half_open_successes = 0;
        inner.metrics.consecutive_failures = 0;
        info!(
            component = %self.name,
            total_calls = inner.metrics.total_calls,
            "🟢 Circuit breaker closed (recovered)"
        );
    }

    fn set_state(&self, state: CircuitState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub async fn force_open(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced open");
        let mut inner = self.inner.lock().await;
        self.open(&mut inner);
    }

    pub async fn force_closed(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced closed");
        let mut inner = self.inner.lock().await;
        self.close(&mut inner);
    }

    pub async fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock().await;
        let mut snapshot = inner.metrics.clone();
        snapshot.current_state = self.state();
        if snapshot.total_calls > 0 {
            snapshot.failure_rate = snapshot.failure_count as f64 / snapshot.total_calls as f64;
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn thresholds(failure_threshold: u32, timeout_ms: u64, success_threshold: u32) -> BreakerThresholds {
        BreakerThresholds {
            failure_threshold,
            timeout_ms,
            success_threshold,
        }
    }

    #[tokio::test]
    async fn test_closed_circuit_passes_calls() {
        let circuit = CircuitBreaker::new("tag_lead", thresholds(3, 100, 2));
        assert_eq!(circuit.state(), CircuitState::Closed);

        let result = circuit.call(|| async { Ok::<_, String>("tagged") }).await;
        assert!(result.is_ok());

        let metrics = circuit.metrics().await;
        assert_eq!(metrics.total_calls, 1);
        assert_eq!(metrics.success_count, 1);
        assert_eq!(metrics.failure_count, 0);
    }

    #[tokio::test]
    async fn test_opens_after_consecutive_failures() {
        let circuit = CircuitBreaker::new("send_email", thresholds(2, 100, 1));

        let _ = circuit.call(|| async { Err::<(), _>("smtp down") }).await;
        assert_eq!(circuit.state(), CircuitState::Closed);
        let _ = circuit.call(|| async { Err::<(), _>("smtp down") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        let result = circuit.call(|| async { Ok::<_, &str>("not invoked") }).await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen { .. })));
        assert_eq!(circuit.metrics().await.rejected_count, 1);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let circuit = CircuitBreaker::new("send_email", thresholds(2, 100, 1));

        let _ = circuit.call(|| async { Err::<(), _>("smtp down") }).await;
        let _ = circuit.call(|| async { Ok::<_, &str>(()) }).await;
        let _ = circuit.call(|| async { Err::<(), _>("smtp down") }).await;
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_recovers_through_half_open() {
        let circuit = CircuitBreaker::new("send_email", thresholds(1, 50, 1));

        let _ = circuit.call(|| async { Err::<(), _>("smtp down") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        sleep(Duration::from_millis(60)).await;

        let result = circuit.call(|| async { Ok::<_, &str>("sent") }).await;
        assert!(result.is_ok());
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let circuit = CircuitBreaker::new("send_email", thresholds(1, 50, 2));

        let _ = circuit.call(|| async { Err::<(), _>("smtp down") }).await;
        sleep(Duration::from_millis(60)).await;
        let _ = circuit.call(|| async { Err::<(), _>("still down") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_force_operations() {
        let circuit = CircuitBreaker::new("tag_lead", thresholds(1, 1_000, 1));

        circuit.force_open().await;
        assert_eq!(circuit.state(), CircuitState::Open);

        circuit.force_closed().await;
        assert_eq!(circuit.state(), CircuitState::Closed);
    }
}
