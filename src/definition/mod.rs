//! # Workflow Definitions
//!
//! Immutable description of a process. Graph-form and table-form definitions
//! compile to the same arena of [`Node`]s keyed by id, so the engine only ever
//! walks one shape: a table's `next`/`on_fail` is just a graph edge.
//!
//! ```rust
//! use workflow_orchestrator::condition::ConditionEvaluator;
//! use workflow_orchestrator::definition::WorkflowDefinition;
//! use serde_json::json;
//!
//! let definition = WorkflowDefinition::load(
//!     json!({
//!         "id": "welcome",
//!         "kind": "graph",
//!         "entry": "send",
//!         "nodes": [
//!             {"id": "send", "type": "action", "activity": "send_welcome", "on_success": "done"},
//!             {"id": "done", "type": "terminal", "outcome": "success"}
//!         ]
//!     }),
//!     &ConditionEvaluator::new(),
//! )
//! .unwrap();
//!
//! assert_eq!(definition.entry, "send");
//! assert_eq!(definition.version, 1);
//! ```

pub mod node;
mod raw;

pub use node::{
    ActionNode, ConditionNode, DelayNode, Node, NodeId, RetryOverride, TerminalNode,
    TerminalOutcome,
};

use crate::condition::ConditionEvaluator;
use crate::error::ValidationError;
use raw::{RawGraph, RawTable};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionKind {
    Graph,
    Table,
}

/// Identity of one version of a definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DefinitionKey {
    pub id: String,
    pub version: u32,
}

impl DefinitionKey {
    pub fn new(id: impl Into<String>, version: u32) -> Self {
        Self {
            id: id.into(),
            version,
        }
    }
}

impl fmt::Display for DefinitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub version: u32,
    pub kind: DefinitionKind,
    pub entry: NodeId,
    pub nodes: BTreeMap<NodeId, Node>,
}

impl WorkflowDefinition {
    /// Assemble and validate a definition from already-built nodes
    pub fn new(
        id: impl Into<String>,
        version: u32,
        kind: DefinitionKind,
        entry: impl Into<NodeId>,
        nodes: BTreeMap<NodeId, Node>,
        conditions: &ConditionEvaluator,
    ) -> Result<Self, ValidationError> {
        let definition = Self {
            id: id.into(),
            version,
            kind,
            entry: entry.into(),
            nodes,
        };
        definition.validate(conditions)?;
        Ok(definition)
    }

    /// Parse and validate a raw JSON-compatible definition. `kind` defaults to
    /// `graph` when absent.
    pub fn load(raw: Value, conditions: &ConditionEvaluator) -> Result<Self, ValidationError> {
        let kind = match raw.get("kind").and_then(Value::as_str).unwrap_or("graph") {
            "graph" => DefinitionKind::Graph,
            "table" => DefinitionKind::Table,
            other => {
                return Err(ValidationError::Malformed(format!(
                    "unknown definition kind '{other}'"
                )))
            }
        };

        let (id, version, (entry, nodes)) = match kind {
            DefinitionKind::Graph => {
                let graph: RawGraph = serde_json::from_value(raw)?;
                (graph.id.clone(), graph.version, graph.compile(conditions)?)
            }
            DefinitionKind::Table => {
                let table: RawTable = serde_json::from_value(raw)?;
                (table.id.clone(), table.version, table.compile(conditions)?)
            }
        };

        let definition = Self::new(id, version, kind, entry, nodes, conditions)?;
        debug!(
            definition = %definition.key(),
            kind = ?definition.kind,
            nodes = definition.nodes.len(),
            "📐 Workflow definition loaded"
        );
        Ok(definition)
    }

    pub fn key(&self) -> DefinitionKey {
        DefinitionKey::new(self.id.clone(), self.version)
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    /// Structural validation; see [`ValidationError`] for what is rejected.
    pub fn validate(&self, conditions: &ConditionEvaluator) -> Result<(), ValidationError> {
        if self.nodes.is_empty() {
            return Err(ValidationError::Empty {
                definition_id: self.id.clone(),
            });
        }
        if !self.nodes.contains_key(&self.entry) {
            return Err(ValidationError::UnknownEntry {
                definition_id: self.id.clone(),
                entry: self.entry.clone(),
            });
        }

        for (node_id, node) in &self.nodes {
            for (route, target) in node.routes() {
                if !self.nodes.contains_key(target) {
                    return Err(ValidationError::UnknownTarget {
                        node_id: node_id.clone(),
                        route: route.to_string(),
                        target: target.clone(),
                    });
                }
            }

            match node {
                Node::Action(action)
                    if action.on_success.is_none() && action.on_failure.is_none() =>
                {
                    return Err(ValidationError::ActionWithoutRoutes {
                        node_id: node_id.clone(),
                    });
                }
                Node::Condition(condition) => {
                    if condition.on_true.is_none()
                        && condition.on_false.is_none()
                        && condition.default.is_none()
                    {
                        return Err(ValidationError::ConditionWithoutBranches {
                            node_id: node_id.clone(),
                        });
                    }
                    if !conditions.supports(&condition.condition) {
                        return Err(ValidationError::UnknownCondition {
                            node_id: node_id.clone(),
                            condition: condition.condition.to_string(),
                        });
                    }
                }
                _ => {}
            }
        }

        let reachable = self.reachable_nodes();
        if reachable.len() < self.nodes.len() {
            let orphans: Vec<&NodeId> = self
                .nodes
                .keys()
                .filter(|node_id| !reachable.contains(node_id.as_str()))
                .collect();
            warn!(
                definition = %self.key(),
                orphans = ?orphans,
                "Definition contains nodes unreachable from the entry node"
            );
        }

        Ok(())
    }

    /// Breadth-first walk from the entry node; cycles are visited once.
    pub fn reachable_nodes(&self) -> HashSet<&str> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(self.entry.as_str());

        while let Some(node_id) = queue.pop_front() {
            if !seen.insert(node_id) {
                continue;
            }
            if let Some(node) = self.nodes.get(node_id) {
                for (_, target) in node.routes() {
                    if !seen.contains(target.as_str()) {
                        queue.push_back(target.as_str());
                    }
                }
            }
        }
        seen
    }
}
