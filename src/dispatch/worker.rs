//! # Worker
//!
//! Consumes continuations from a [`TokioDispatcher`](super::TokioDispatcher)
//! channel and resumes runs on the engine, at most `max_concurrent_ticks` at a
//! time.
//!
//! Stale continuations are expected under at-least-once delivery: whichever
//! worker advanced the run first already scheduled the next continuation, so
//! the loser's is simply dropped.

use super::{Continuation, Dispatcher};
use crate::config::WorkerConfig;
use crate::orchestration::{OrchestrationEngine, TickOutcome};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info};

#[derive(Debug, Default)]
pub struct WorkerStats {
    pub ticks: AtomicU64,
    pub finished_runs: AtomicU64,
    pub stale_continuations: AtomicU64,
    pub deferred: AtomicU64,
    pub errors: AtomicU64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            finished_runs: self.finished_runs.load(Ordering::Relaxed),
            stale_continuations: self.stale_continuations.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerStatsSnapshot {
    pub ticks: u64,
    pub finished_runs: u64,
    pub stale_continuations: u64,
    pub deferred: u64,
    pub errors: u64,
}

pub struct Worker {
    engine: Arc<OrchestrationEngine>,
    dispatcher: Arc<dyn Dispatcher>,
    receiver: mpsc::Receiver<Continuation>,
    permits: Arc<Semaphore>,
    max_concurrent_ticks: usize,
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// `dispatcher` must be the sender side of `receiver`; it is used to defer
    /// continuations delivered before their run's resume time.
    pub fn new(
        engine: Arc<OrchestrationEngine>,
        dispatcher: Arc<dyn Dispatcher>,
        receiver: mpsc::Receiver<Continuation>,
        config: &WorkerConfig,
    ) -> Self {
        let max_concurrent_ticks = config.max_concurrent_ticks.max(1);
        Self {
            engine,
            dispatcher,
            receiver,
            permits: Arc::new(Semaphore::new(max_concurrent_ticks)),
            max_concurrent_ticks,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Process continuations until `shutdown` resolves, then wait for the
    /// ticks in flight.
    pub async fn run_until<F>(mut self, shutdown: F) -> WorkerStatsSnapshot
    where
        F: Future<Output = ()>,
    {
        info!(max_concurrent_ticks = self.max_concurrent_ticks, "👷 Worker started");
        tokio::pin!(shutdown);

        loop {
            let continuation = tokio::select! {
                _ = &mut shutdown => break,
                received = self.receiver.recv() => match received {
                    Some(continuation) => continuation,
                    None => break,
                },
            };

            let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
                break;
            };
            let engine = Arc::clone(&self.engine);
            let dispatcher = Arc::clone(&self.dispatcher);
            let stats = Arc::clone(&self.stats);
            tokio::spawn(async move {
                let _permit = permit;
                process(&engine, dispatcher.as_ref(), &stats, continuation).await;
            });
        }

        // Drain: every permit back means no tick is still running
        let _ = self
            .permits
            .acquire_many(self.max_concurrent_ticks as u32)
            .await;
        let snapshot = self.stats.snapshot();
        info!(
            ticks = snapshot.ticks,
            finished_runs = snapshot.finished_runs,
            stale = snapshot.stale_continuations,
            errors = snapshot.errors,
            "👷 Worker stopped"
        );
        snapshot
    }

    pub async fn run(self) -> WorkerStatsSnapshot {
        self.run_until(std::future::pending()).await
    }
}

async fn process(
    engine: &OrchestrationEngine,
    dispatcher: &dyn Dispatcher,
    stats: &WorkerStats,
    continuation: Continuation,
) {
    stats.ticks.fetch_add(1, Ordering::Relaxed);
    match engine.resume(continuation).await {
        Ok(TickOutcome::NotReady { remaining }) => {
            stats.deferred.fetch_add(1, Ordering::Relaxed);
            if let Err(error) = dispatcher.schedule_tick(continuation, remaining).await {
                error!(run_id = %continuation.run_id, error = %error, "Failed to defer early continuation");
            }
        }
        Ok(outcome) => {
            if outcome.is_final() {
                stats.finished_runs.fetch_add(1, Ordering::Relaxed);
            }
            debug!(run_id = %continuation.run_id, outcome = ?outcome, "Tick finished");
        }
        Err(error) if error.is_concurrent_modification() => {
            stats.stale_continuations.fetch_add(1, Ordering::Relaxed);
            debug!(run_id = %continuation.run_id, error = %error, "Dropping stale continuation");
        }
        Err(error) => {
            stats.errors.fetch_add(1, Ordering::Relaxed);
            error!(run_id = %continuation.run_id, error = %error, "Tick failed");
        }
    }
}
