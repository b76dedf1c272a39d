//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use workflow_orchestrator::condition::ConditionEvaluator;
use workflow_orchestrator::config::EngineConfig;
use workflow_orchestrator::dispatch::DispatchError;
use workflow_orchestrator::{
    Continuation, Dispatcher, InMemoryActivityRegistry, InMemoryRunStore, OrchestrationEngine,
    RecordingDispatcher, RetryPolicyConfig, StepResult, TickOutcome, WorkflowDefinition,
};

/// Engine wired to in-memory collaborators
pub struct TestEngine {
    pub engine: OrchestrationEngine,
    pub store: InMemoryRunStore,
    pub dispatcher: Arc<RecordingDispatcher>,
}

/// Dispatcher whose queue is always down
#[derive(Debug, Default)]
pub struct FailingDispatcher;

#[async_trait::async_trait]
impl Dispatcher for FailingDispatcher {
    async fn schedule_tick(&self, _continuation: Continuation, _after: Duration) -> Result<(), DispatchError> {
        Err(DispatchError::Backend("queue down".to_string()))
    }
}

/// Millisecond backoff so retry scenarios finish quickly
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        retry: RetryPolicyConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 10,
            multiplier: 2.0,
        },
        default_step_timeout_ms: 2_000,
        ..EngineConfig::default()
    }
}

pub fn test_engine(activities: InMemoryActivityRegistry) -> TestEngine {
    test_engine_with(activities, fast_config(), ConditionEvaluator::new())
}

pub fn test_engine_with(
    activities: InMemoryActivityRegistry,
    config: EngineConfig,
    conditions: ConditionEvaluator,
) -> TestEngine {
    let store = InMemoryRunStore::new();
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let engine = OrchestrationEngine::builder(
        Arc::new(store.clone()),
        dispatcher.clone(),
        Arc::new(activities),
    )
    .conditions(conditions)
    .config(config)
    .build()
    .expect("test engine config is valid");
    TestEngine {
        engine,
        store,
        dispatcher,
    }
}

pub fn definition(raw: Value) -> WorkflowDefinition {
    definition_with(raw, &ConditionEvaluator::new())
}

pub fn definition_with(raw: Value, conditions: &ConditionEvaluator) -> WorkflowDefinition {
    WorkflowDefinition::load(raw, conditions).expect("test definition is valid")
}

/// `start(action) -> done(terminal success)`
pub fn linear_definition(activity: &str) -> WorkflowDefinition {
    definition(json!({
        "id": "linear",
        "entry": "start",
        "nodes": [
            {"id": "start", "type": "action", "activity": activity, "on_success": "done"},
            {"id": "done", "type": "terminal", "outcome": "success"}
        ]
    }))
}

/// Registers an activity that fails transiently `failures` times, then succeeds.
/// Returns the invocation counter.
pub fn flaky_activity(
    activities: &InMemoryActivityRegistry,
    name: &str,
    failures: u32,
) -> Arc<AtomicU32> {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    activities.register_fn(name, move |_| {
        let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if call <= failures {
                StepResult::transient(format!("flaky call {call}"))
            } else {
                StepResult::success_with(json!({"calls": call}))
            }
        }
    });
    calls
}

/// Registers an activity that records each invocation and always succeeds
pub fn counting_activity(activities: &InMemoryActivityRegistry, name: &str) -> Arc<AtomicU32> {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    activities.register_fn(name, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { StepResult::success() }
    });
    calls
}

/// Tick a run until it finishes, sleeping through short suspensions.
/// Returns the final outcome and the number of ticks taken.
pub async fn run_until_final(engine: &OrchestrationEngine, run_id: Uuid) -> (TickOutcome, u32) {
    let mut ticks = 0;
    loop {
        ticks += 1;
        assert!(ticks <= 100, "run {run_id} did not finish within 100 ticks");

        let outcome = engine.tick(run_id).await.expect("tick succeeds");
        match &outcome {
            TickOutcome::Suspended { resume_after, .. } => {
                tokio::time::sleep(*resume_after + Duration::from_millis(2)).await;
            }
            TickOutcome::NotReady { remaining } => {
                tokio::time::sleep(*remaining + Duration::from_millis(2)).await;
            }
            TickOutcome::Yielded { .. } => {}
            _ => return (outcome, ticks),
        }
    }
}
