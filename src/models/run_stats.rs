//! # Run Statistics
//!
//! Aggregate view over the runs of one definition. Nothing here is stored;
//! [`RunStats::from_records`] computes it on demand from whatever records the
//! caller loaded.
//!
//! - status counts, success and failure rates over finished runs
//! - average wall time of finished runs (`created_at` to last update)
//! - per-node activity timing from the `duration_ms` of each step record

use crate::definition::NodeId;
use crate::models::RunRecord;
use crate::state_machine::RunStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Activity timing for one node across all sampled runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeTiming {
    /// Timed activity attempts, retries included
    pub executions: u64,
    pub failures: u64,
    pub total_duration_ms: u64,
    pub max_duration_ms: u64,
}

impl NodeTiming {
    pub fn average_duration_ms(&self) -> f64 {
        if self.executions == 0 {
            return 0.0;
        }
        self.total_duration_ms as f64 / self.executions as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub definition_id: String,
    pub total: u64,
    pub pending: u64,
    pub running: u64,
    pub suspended: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Completed share of finished runs, 0.0 when none finished
    pub success_rate: f64,
    /// Failed share of finished runs, 0.0 when none finished
    pub failure_rate: f64,
    /// Mean wall time of finished runs; `None` when none finished
    pub average_run_duration_ms: Option<f64>,
    pub node_timings: BTreeMap<NodeId, NodeTiming>,
}

impl RunStats {
    pub fn from_records(definition_id: &str, records: &[RunRecord]) -> Self {
        let mut stats = Self {
            definition_id: definition_id.to_string(),
            ..Self::default()
        };
        let mut finished_duration_ms: i64 = 0;

        for record in records {
            stats.total += 1;
            match record.status {
                RunStatus::Pending => stats.pending += 1,
                RunStatus::Running => stats.running += 1,
                RunStatus::Suspended => stats.suspended += 1,
                RunStatus::Completed => stats.completed += 1,
                RunStatus::Failed => stats.failed += 1,
                RunStatus::Cancelled => stats.cancelled += 1,
            }
            if record.is_finished() {
                finished_duration_ms += (record.updated_at - record.created_at)
                    .num_milliseconds()
                    .max(0);
            }

            for step in record.history.iter() {
                let Some(duration_ms) = step.duration_ms else {
                    continue;
                };
                let timing = stats.node_timings.entry(step.node_id.clone()).or_default();
                timing.executions += 1;
                timing.total_duration_ms = timing.total_duration_ms.saturating_add(duration_ms);
                timing.max_duration_ms = timing.max_duration_ms.max(duration_ms);
                if step.outcome.is_failure() {
                    timing.failures += 1;
                }
            }
        }

        let finished = stats.finished();
        if finished > 0 {
            stats.success_rate = stats.completed as f64 / finished as f64;
            stats.failure_rate = stats.failed as f64 / finished as f64;
            stats.average_run_duration_ms = Some(finished_duration_ms as f64 / finished as f64);
        }
        stats
    }

    /// Runs in a terminal status
    pub fn finished(&self) -> u64 {
        self.completed + self.failed + self.cancelled
    }

    /// Runs that can still make progress
    pub fn active(&self) -> u64 {
        self.pending + self.running + self.suspended
    }
}
