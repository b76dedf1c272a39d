//! # Dispatch
//!
//! The engine never sleeps or spawns on its own. Whenever a run must continue
//! later (after a delay node, a retry backoff or a yielded tick) it hands a
//! [`Continuation`] to a [`Dispatcher`], which delivers it back to
//! `OrchestrationEngine::resume` after the requested delay.
//!
//! Delivery is at least once. The continuation carries the record version it
//! was scheduled against, so a duplicate or stale delivery is detected by
//! the engine and changes nothing.

pub mod tokio_dispatcher;
pub mod worker;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub use tokio_dispatcher::TokioDispatcher;
pub use worker::Worker;

/// Persisted pointer to where a run resumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Continuation {
    pub run_id: Uuid,
    /// Record version the continuation was scheduled against
    pub version: u64,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Dispatcher is shut down")]
    Closed,
    #[error("Dispatcher error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn schedule_tick(&self, continuation: Continuation, after: Duration) -> Result<(), DispatchError>;
}

/// One scheduling request captured by [`RecordingDispatcher`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTick {
    pub continuation: Continuation,
    pub after: Duration,
}

/// Dispatcher that only records what was scheduled. Callers drive the run
/// themselves, which keeps tests and embedded use deterministic.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    scheduled: Mutex<Vec<ScheduledTick>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduled(&self) -> Vec<ScheduledTick> {
        self.scheduled.lock().clone()
    }

    pub fn last(&self) -> Option<ScheduledTick> {
        self.scheduled.lock().last().copied()
    }

    /// Remove and return everything scheduled so far
    pub fn drain(&self) -> Vec<ScheduledTick> {
        std::mem::take(&mut *self.scheduled.lock())
    }

    pub fn len(&self) -> usize {
        self.scheduled.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.scheduled.lock().is_empty()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn schedule_tick(&self, continuation: Continuation, after: Duration) -> Result<(), DispatchError> {
        self.scheduled.lock().push(ScheduledTick { continuation, after });
        Ok(())
    }
}
