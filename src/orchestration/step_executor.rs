//! # Step Executor
//!
//! Invokes the activity behind an action node and classifies the outcome into a
//! [`StepResult`]. Everything that can go wrong around the call itself is
//! folded into that classification:
//!
//! - unknown activity name: `PermanentFailure`
//! - open circuit for the activity: `TransientFailure("circuit open")`
//! - activity exceeds its timeout: `TransientFailure("timeout ...")`
//!
//! The executor never touches the run record; routing on the result is the
//! engine's job.

use crate::orchestration::types::{ActivityInvocation, StepResult};
use crate::registry::ActivityRegistry;
use crate::resilience::{CircuitBreakerError, CircuitBreakerManager, CircuitBreakerConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

pub struct StepExecutor {
    registry: Arc<dyn ActivityRegistry>,
    breakers: CircuitBreakerManager,
    default_timeout: Duration,
}

impl std::fmt::Debug for StepExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepExecutor")
            .field("default_timeout", &self.default_timeout)
            .field("breakers", &self.breakers)
            .finish()
    }
}

impl StepExecutor {
    pub fn new(
        registry: Arc<dyn ActivityRegistry>,
        breaker_config: CircuitBreakerConfig,
        default_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            breakers: CircuitBreakerManager::new(breaker_config),
            default_timeout,
        }
    }

    pub fn breakers(&self) -> &CircuitBreakerManager {
        &self.breakers
    }

    /// Run `activity` once for `invocation`
    pub async fn execute(
        &self,
        activity: &str,
        invocation: &ActivityInvocation,
        timeout_override: Option<Duration>,
    ) -> StepResult {
        let Some(handler) = self.registry.resolve(activity) else {
            warn!(
                run_id = %invocation.run_id,
                node_id = %invocation.node_id,
                activity = %activity,
                "Activity is not registered"
            );
            return StepResult::permanent(format!("activity '{activity}' is not registered"));
        };

        let step_timeout = timeout_override.unwrap_or(self.default_timeout);
        let started = Instant::now();
        let handler = handler.as_ref();

        let guarded = move || async move {
            let result = match timeout(step_timeout, handler.invoke(invocation)).await {
                Ok(result) => result,
                Err(_) => StepResult::transient(format!(
                    "timeout after {}ms",
                    step_timeout.as_millis()
                )),
            };
            // Only transient outcomes count against the breaker
            match result {
                StepResult::TransientFailure { .. } => Err(result),
                other => Ok(other),
            }
        };

        let result = match self.breakers.breaker_for(activity) {
            Some(breaker) => match breaker.call(guarded).await {
                Ok(result) | Err(CircuitBreakerError::OperationFailed(result)) => result,
                Err(CircuitBreakerError::CircuitOpen { .. }) => {
                    debug!(
                        run_id = %invocation.run_id,
                        node_id = %invocation.node_id,
                        activity = %activity,
                        "Circuit open, activity not invoked"
                    );
                    StepResult::transient("circuit open")
                }
            },
            None => match guarded().await {
                Ok(result) | Err(result) => result,
            },
        };

        debug!(
            run_id = %invocation.run_id,
            node_id = %invocation.node_id,
            activity = %activity,
            attempt = invocation.attempt,
            duration_ms = started.elapsed().as_millis() as u64,
            success = result.is_success(),
            "Activity invocation finished"
        );

        result
    }

    /// Best-effort invocation used for compensations: same timeout and
    /// classification, no breaker.
    pub async fn execute_unguarded(
        &self,
        activity: &str,
        invocation: &ActivityInvocation,
    ) -> StepResult {
        let Some(handler) = self.registry.resolve(activity) else {
            return StepResult::permanent(format!("activity '{activity}' is not registered"));
        };
        match timeout(self.default_timeout, handler.invoke(invocation)).await {
            Ok(result) => result,
            Err(_) => StepResult::transient(format!(
                "timeout after {}ms",
                self.default_timeout.as_millis()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecutionContext;
    use crate::registry::InMemoryActivityRegistry;
    use crate::resilience::BreakerThresholds;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    fn invocation() -> ActivityInvocation {
        ActivityInvocation {
            run_id: Uuid::new_v4(),
            node_id: "send".to_string(),
            attempt: 1,
            context: ExecutionContext::new(),
        }
    }

    fn executor(registry: InMemoryActivityRegistry, breakers: CircuitBreakerConfig) -> StepExecutor {
        StepExecutor::new(Arc::new(registry), breakers, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_missing_activity_is_permanent() {
        let executor = executor(InMemoryActivityRegistry::new(), CircuitBreakerConfig::default());
        let result = executor.execute("ghost", &invocation(), None).await;
        assert!(matches!(result, StepResult::PermanentFailure { ref reason } if reason.contains("ghost")));
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let registry = InMemoryActivityRegistry::new();
        registry.register_fn("tag", |_| async { StepResult::success_with(json!({"tagged": true})) });
        let executor = executor(registry, CircuitBreakerConfig::default());

        let result = executor.execute("tag", &invocation(), None).await;
        assert_eq!(result, StepResult::success_with(json!({"tagged": true})));
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let registry = InMemoryActivityRegistry::new();
        registry.register_fn("slow", |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            StepResult::success()
        });
        let executor = executor(registry, CircuitBreakerConfig::default());

        let result = executor
            .execute("slow", &invocation(), Some(Duration::from_millis(20)))
            .await;
        assert!(matches!(result, StepResult::TransientFailure { ref reason, .. } if reason.starts_with("timeout")));
    }

    #[tokio::test]
    async fn test_open_circuit_skips_activity() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let registry = InMemoryActivityRegistry::new();
        registry.register_fn("flaky", move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                StepResult::transient("upstream 503")
            }
        });

        let mut breakers = CircuitBreakerConfig::enabled();
        breakers.defaults = BreakerThresholds {
            failure_threshold: 2,
            timeout_ms: 60_000,
            success_threshold: 1,
        };
        let executor = executor(registry, breakers);

        executor.execute("flaky", &invocation(), None).await;
        executor.execute("flaky", &invocation(), None).await;
        let third = executor.execute("flaky", &invocation(), None).await;

        assert_eq!(third, StepResult::transient("circuit open"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_failures_do_not_trip_breaker() {
        let registry = InMemoryActivityRegistry::new();
        registry.register_fn("reject", |_| async { StepResult::permanent("invalid email") });

        let mut breakers = CircuitBreakerConfig::enabled();
        breakers.defaults.failure_threshold = 1;
        let executor = executor(registry, breakers);

        executor.execute("reject", &invocation(), None).await;
        let second = executor.execute("reject", &invocation(), None).await;
        assert_eq!(second, StepResult::permanent("invalid email"));
    }
}
