//! Engine Benchmarks
//!
//! Definition loading, condition evaluation and full in-memory runs.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};
use std::sync::Arc;
use workflow_orchestrator::{
    ConditionEvaluator, ExecutionContext, InMemoryActivityRegistry, InMemoryRunStore,
    OrchestrationEngine, RecordingDispatcher, StepResult, WorkflowDefinition,
};

/// `length` chained action nodes ending in a success terminal
fn chain(length: usize) -> Value {
    let mut nodes: Vec<Value> = (0..length)
        .map(|index| {
            let next = if index + 1 == length {
                "done".to_string()
            } else {
                format!("step_{}", index + 1)
            };
            json!({"id": format!("step_{index}"), "type": "action", "activity": "noop", "on_success": next})
        })
        .collect();
    nodes.push(json!({"id": "done", "type": "terminal", "outcome": "success"}));
    json!({"id": format!("chain_{length}"), "entry": "step_0", "nodes": nodes})
}

fn benchmark_definition_loading(c: &mut Criterion) {
    let conditions = ConditionEvaluator::new();
    let mut group = c.benchmark_group("definition_load");
    for length in [10, 100] {
        let raw = chain(length);
        group.bench_with_input(BenchmarkId::from_parameter(length), &raw, |b, raw| {
            b.iter(|| WorkflowDefinition::load(black_box(raw.clone()), &conditions))
        });
    }
    group.finish();
}

fn benchmark_condition_evaluation(c: &mut Criterion) {
    let evaluator = ConditionEvaluator::new().with_predicate("is_vip", |ctx| {
        ctx.get("tier").and_then(Value::as_str) == Some("vip")
    });
    let context = ExecutionContext::from_value(json!({
        "tier": "vip",
        "order": {"total": 250, "items": ["book", "lamp"]}
    }))
    .unwrap();

    c.bench_function("condition_named", |b| {
        b.iter(|| evaluator.evaluate(black_box("is_vip"), &context))
    });
    c.bench_function("condition_expression", |b| {
        b.iter(|| evaluator.evaluate(black_box("order.total >= 100"), &context))
    });
}

fn benchmark_linear_run(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let activities = InMemoryActivityRegistry::new();
    activities.register_fn("noop", |_| async { StepResult::success() });
    let engine = OrchestrationEngine::builder(
        Arc::new(InMemoryRunStore::new()),
        Arc::new(RecordingDispatcher::new()),
        Arc::new(activities),
    )
    .build()
    .unwrap();
    let definition = engine.load_definition(chain(20)).unwrap();

    c.bench_function("run_chain_20", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let run_id = engine
                    .start_by_id(&definition.id, None, ExecutionContext::new())
                    .await
                    .unwrap();
                engine.tick(run_id).await.unwrap()
            })
        })
    });
}

criterion_group!(
    benches,
    benchmark_definition_loading,
    benchmark_condition_evaluation,
    benchmark_linear_run
);
criterion_main!(benches);
