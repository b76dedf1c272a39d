//! # Run Record
//!
//! The persisted state of one workflow run. Only the orchestration engine mutates
//! it, one step boundary at a time, and every persisted mutation bumps `version`.

use crate::definition::{DefinitionKey, NodeId, WorkflowDefinition};
use crate::models::{ExecutionContext, StepHistory};
use crate::state_machine::RunStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Why a run ended in `Failed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunFailure {
    /// No route exists for the outcome the node produced
    UnresolvedBranch { node_id: NodeId, outcome: String },
    /// Activity reported a non-retryable failure and the node has no failure route
    ActivityPermanent { node_id: NodeId, reason: String },
    /// Transient failures used up the retry budget and the node has no failure route
    RetriesExhausted {
        node_id: NodeId,
        attempts: u32,
        reason: String,
    },
    /// The run evaluated more nodes than the configured budget allows
    StepBudgetExceeded { budget: u64 },
    /// A failure-flavored terminal node was reached
    TerminalFailure { node_id: NodeId },
    /// The node the run points at no longer exists in its definition
    NodeNotFound { node_id: NodeId },
    /// A condition referenced by the definition is no longer registered
    ConditionUnavailable { node_id: NodeId, condition: String },
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedBranch { node_id, outcome } => {
                write!(f, "unresolved branch at {node_id} for outcome {outcome}")
            }
            Self::ActivityPermanent { node_id, reason } => {
                write!(f, "activity at {node_id} failed permanently: {reason}")
            }
            Self::RetriesExhausted {
                node_id,
                attempts,
                reason,
            } => write!(
                f,
                "activity at {node_id} exhausted {attempts} attempts: {reason}"
            ),
            Self::StepBudgetExceeded { budget } => write!(f, "step budget of {budget} exceeded"),
            Self::TerminalFailure { node_id } => write!(f, "reached failure terminal {node_id}"),
            Self::NodeNotFound { node_id } => write!(f, "node {node_id} not found"),
            Self::ConditionUnavailable { node_id, condition } => {
                write!(f, "condition {condition} at {node_id} unavailable")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub definition_id: String,
    pub definition_version: u32,
    /// The definition as it was at start. Any worker sharing the store can
    /// advance the run from this snapshot.
    pub definition: Arc<WorkflowDefinition>,
    pub current_node: NodeId,
    pub context: ExecutionContext,
    pub history: StepHistory,
    pub status: RunStatus,
    /// Visit counter per node
    pub attempts: BTreeMap<NodeId, u32>,
    /// 1-based attempt number of the activity at `current_node`
    pub current_attempt: u32,
    /// Node evaluations across the whole run, checked against the step budget
    pub steps_taken: u64,
    /// Earliest moment the next tick may make progress
    pub resume_at: Option<DateTime<Utc>>,
    pub failure: Option<RunFailure>,
    /// Optimistic lock; 0 means never persisted
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    /// Create a pending run positioned at the definition's entry node
    pub fn new(definition: &WorkflowDefinition, context: ExecutionContext) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            definition_id: definition.id.clone(),
            definition_version: definition.version,
            definition: Arc::new(definition.clone()),
            current_node: definition.entry.clone(),
            context,
            history: StepHistory::new(),
            status: RunStatus::Pending,
            attempts: BTreeMap::new(),
            current_attempt: 1,
            steps_taken: 0,
            resume_at: None,
            failure: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn definition_key(&self) -> DefinitionKey {
        DefinitionKey::new(self.definition_id.clone(), self.definition_version)
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn visits(&self, node_id: &str) -> u32 {
        self.attempts.get(node_id).copied().unwrap_or(0)
    }

    pub(crate) fn record_visit(&mut self, node_id: &str) {
        *self.attempts.entry(node_id.to_string()).or_insert(0) += 1;
        self.steps_taken += 1;
    }

    /// Move to another node; the attempt counter restarts there
    pub(crate) fn move_to(&mut self, node_id: NodeId) {
        self.current_node = node_id;
        self.current_attempt = 1;
        self.resume_at = None;
    }

    /// Copy of this record prepared for the next save
    pub(crate) fn next_version(&self) -> Self {
        let mut next = self.clone();
        next.version = self.version + 1;
        next.updated_at = Utc::now();
        next
    }
}
