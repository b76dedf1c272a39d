//! Error types for the workflow orchestrator.
//!

use crate::config::ConfigurationError;
use crate::definition::NodeId;
use crate::state_machine::{RunEvent, RunStatus};
use thiserror::Error;
use uuid::Uuid;

/// A workflow definition that cannot be executed.
///
/// Raised only while loading a definition, never while a run is in flight, so a
/// broken graph fails before any activity has side effects.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Malformed definition: {0}")]
    Malformed(String),
    #[error("Definition {definition_id} has no nodes")]
    Empty { definition_id: String },
    #[error("Definition {definition_id} declares no entry node and no node is flagged is_start")]
    MissingEntryDeclaration { definition_id: String },
    #[error("Definition {definition_id} flags more than one start node: {candidates:?}")]
    AmbiguousEntry {
        definition_id: String,
        candidates: Vec<NodeId>,
    },
    #[error("Entry node {entry} does not exist in definition {definition_id}")]
    UnknownEntry { definition_id: String, entry: NodeId },
    #[error("Duplicate node id {node_id}")]
    DuplicateNode { node_id: NodeId },
    #[error("Node {node_id} routes {route} to unknown node {target}")]
    UnknownTarget {
        node_id: NodeId,
        route: String,
        target: NodeId,
    },
    #[error("Edge references unknown source node {source_node}")]
    UnknownEdgeSource { source_node: NodeId },
    #[error("Edge from {node_id} uses branch {branch} which does not apply to a {node_type} node")]
    InvalidEdgeBranch {
        node_id: NodeId,
        branch: String,
        node_type: String,
    },
    #[error("Action node {node_id} has neither on_success nor on_failure")]
    ActionWithoutRoutes { node_id: NodeId },
    #[error("Condition node {node_id} has no branches and no default")]
    ConditionWithoutBranches { node_id: NodeId },
    #[error("Delay node {node_id} has no next node")]
    DelayWithoutNext { node_id: NodeId },
    #[error("Unknown condition '{condition}' on node {node_id}")]
    UnknownCondition { node_id: NodeId, condition: String },
    #[error("Invalid condition expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },
    #[error("Unknown condition '{0}'")]
    UnregisteredCondition(String),
}

impl From<serde_json::Error> for ValidationError {
    fn from(error: serde_json::Error) -> Self {
        ValidationError::Malformed(error.to_string())
    }
}

/// Errors surfaced by the engine's public API.
///
/// Run-level failures (unresolved branches, exhausted retries, runaway graphs) are
/// not errors of the API call: they end the run in `Failed` and are recorded as a
/// [`RunFailure`](crate::models::RunFailure) on the record.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Run {0} not found")]
    RunNotFound(Uuid),

    #[error("Definition {definition_id}@{version} is not registered")]
    DefinitionNotFound { definition_id: String, version: u32 },

    #[error("Definition {definition_id}@{version} is already registered with different content")]
    DefinitionConflict { definition_id: String, version: u32 },

    /// Another worker advanced the run first. Callers retry against fresh state.
    #[error("Concurrent modification of run {run_id}: expected version {expected}, found {actual}")]
    ConcurrentModification {
        run_id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("Run {run_id} is already finished with status {status}")]
    RunFinished { run_id: Uuid, status: RunStatus },

    #[error("Invalid status transition from {from} on event {event}")]
    InvalidTransition { from: RunStatus, event: RunEvent },

    #[error("Run store error: {0}")]
    Store(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl EngineError {
    /// Whether the caller should reload and retry the operation.
    pub fn is_concurrent_modification(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
