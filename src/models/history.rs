//! Append-only step history of a run.

use crate::definition::{NodeId, TerminalOutcome};
use crate::models::RunFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happened when the engine processed a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Activity returned success; its output was merged into the context
    Succeeded,
    /// Condition node evaluated; `target` is the route that was taken
    BranchTaken { result: bool, target: NodeId },
    TransientFailure { reason: String },
    PermanentFailure { reason: String },
    RetryScheduled { after_ms: u64 },
    /// Delay node parked the run until `until`
    Delayed { until: DateTime<Utc> },
    Terminal { outcome: TerminalOutcome },
    RunFailed { failure: RunFailure },
    Cancelled,
    Compensated { activity: String },
    CompensationFailed { activity: String, reason: String },
}

impl StepOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::TransientFailure { .. }
                | Self::PermanentFailure { .. }
                | Self::RunFailed { .. }
                | Self::CompensationFailed { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub node_id: NodeId,
    pub attempt: u32,
    pub outcome: StepOutcome,
    pub recorded_at: DateTime<Utc>,
    /// Wall time of the activity call, for action attempts only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepHistory {
    records: Vec<StepRecord>,
}

impl StepHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, node_id: impl Into<NodeId>, attempt: u32, outcome: StepOutcome) {
        self.push(node_id.into(), attempt, outcome, None);
    }

    /// Record an activity attempt together with how long the call took
    pub fn record_timed(
        &mut self,
        node_id: impl Into<NodeId>,
        attempt: u32,
        outcome: StepOutcome,
        elapsed: Duration,
    ) {
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.push(node_id.into(), attempt, outcome, Some(duration_ms));
    }

    fn push(&mut self, node_id: NodeId, attempt: u32, outcome: StepOutcome, duration_ms: Option<u64>) {
        self.records.push(StepRecord {
            node_id,
            attempt,
            outcome,
            recorded_at: Utc::now(),
            duration_ms,
        });
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &StepRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&StepRecord> {
        self.records.last()
    }

    /// Nodes whose activity succeeded, most recent first.
    pub fn succeeded_nodes_rev(&self) -> impl Iterator<Item = &NodeId> {
        self.records
            .iter()
            .rev()
            .filter(|record| record.outcome == StepOutcome::Succeeded)
            .map(|record| &record.node_id)
    }
}
