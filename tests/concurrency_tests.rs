//! Optimistic concurrency between workers and end-to-end dispatch.

mod common;

use common::*;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Barrier};
use workflow_orchestrator::config::WorkerConfig;
use workflow_orchestrator::{
    ExecutionContext, InMemoryActivityRegistry, InMemoryRunStore, OrchestrationEngine,
    RunStatus, StepResult, TickOutcome, TokioDispatcher, Worker,
};

#[tokio::test]
async fn test_concurrent_ticks_advance_once() {
    let activities = InMemoryActivityRegistry::new();
    let rendezvous = Arc::new(Barrier::new(2));
    let barrier = Arc::clone(&rendezvous);
    activities.register_fn("noop", move |_| {
        let barrier = Arc::clone(&barrier);
        async move {
            // Both ticks have loaded version 1 before either saves
            barrier.wait().await;
            StepResult::success()
        }
    });
    let harness = test_engine(activities);

    let run_id = harness
        .engine
        .start(linear_definition("noop"), ExecutionContext::new())
        .await
        .unwrap();
    let (first, second) = tokio::join!(harness.engine.tick(run_id), harness.engine.tick(run_id));

    let results = [first, second];
    let advanced = results
        .iter()
        .filter(|result| matches!(result, Ok(TickOutcome::Completed)))
        .count();
    let conflicts = results
        .iter()
        .filter(|result| matches!(result, Err(error) if error.is_concurrent_modification()))
        .count();
    assert_eq!(advanced, 1);
    assert_eq!(conflicts, 1);

    // The losing tick left no trace in the record
    let record = harness.engine.get_status(run_id).await.unwrap();
    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(record.version, 3);
    assert_eq!(record.visits("start"), 1);
    assert_eq!(record.history.len(), 2);
}

#[tokio::test]
async fn test_duplicate_continuation_delivery_is_rejected() {
    let activities = InMemoryActivityRegistry::new();
    let calls = counting_activity(&activities, "noop");
    let harness = test_engine(activities);

    let run_id = harness
        .engine
        .start(linear_definition("noop"), ExecutionContext::new())
        .await
        .unwrap();
    let continuation = harness.dispatcher.last().unwrap().continuation;

    assert_eq!(
        harness.engine.resume(continuation).await.unwrap(),
        TickOutcome::Completed
    );
    let duplicate = harness.engine.resume(continuation).await.unwrap_err();
    assert!(duplicate.is_concurrent_modification());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancel_wins_over_tick_in_flight() {
    let activities = InMemoryActivityRegistry::new();
    let started = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let (started_in_activity, release_in_activity) = (Arc::clone(&started), Arc::clone(&release));
    activities.register_fn("slow", move |_| {
        let started = Arc::clone(&started_in_activity);
        let release = Arc::clone(&release_in_activity);
        async move {
            started.wait().await;
            release.wait().await;
            StepResult::success()
        }
    });
    let harness = test_engine(activities);

    let run_id = harness
        .engine
        .start(linear_definition("slow"), ExecutionContext::new())
        .await
        .unwrap();

    let cancel = async {
        started.wait().await;
        let cancelled = harness.engine.cancel(run_id).await;
        release.wait().await;
        cancelled
    };
    let (tick, cancelled) = tokio::join!(harness.engine.tick(run_id), cancel);

    assert!(tick.unwrap_err().is_concurrent_modification());
    assert_eq!(cancelled.unwrap().status, RunStatus::Cancelled);
    assert_eq!(harness.engine.tick(run_id).await.unwrap(), TickOutcome::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_drives_runs_to_completion() {
    let activities = InMemoryActivityRegistry::new();
    flaky_activity(&activities, "flaky", 1);
    let (dispatcher, receiver) = TokioDispatcher::new(64);
    let engine = Arc::new(
        OrchestrationEngine::builder(
            Arc::new(InMemoryRunStore::new()),
            Arc::new(dispatcher.clone()),
            Arc::new(activities),
        )
        .config(fast_config())
        .build()
        .unwrap(),
    );

    let worker = Worker::new(
        Arc::clone(&engine),
        Arc::new(dispatcher),
        receiver,
        &WorkerConfig {
            max_concurrent_ticks: 4,
            queue_capacity: 64,
        },
    );
    let stats = worker.stats();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(worker.run_until(async {
        let _ = shutdown_rx.await;
    }));

    let delayed = definition(json!({
        "id": "onboarding",
        "entry": "wait",
        "nodes": [
            {"id": "wait", "type": "delay", "delay_ms": 20, "next": "welcome"},
            {"id": "welcome", "type": "action", "activity": "flaky", "on_success": "done"},
            {"id": "done", "type": "terminal", "outcome": "success"}
        ]
    }));
    let run_id = engine.start(delayed, ExecutionContext::new()).await.unwrap();

    let finished = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let record = engine.get_status(run_id).await.unwrap();
            if record.is_finished() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("run finishes within 5 seconds");
    assert_eq!(finished.status, RunStatus::Completed);
    assert_eq!(finished.context.get("calls"), Some(&json!(2)));

    shutdown_tx.send(()).unwrap();
    let snapshot = handle.await.unwrap();
    assert_eq!(snapshot.finished_runs, 1);
    assert_eq!(snapshot.errors, 0);
    assert!(snapshot.ticks >= 3);
    assert_eq!(stats.snapshot(), snapshot);
}
