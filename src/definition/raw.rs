//! Raw (JSON-compatible) definition shapes and their compilation into nodes.
//!
//! Three shapes are accepted:
//! - graph with routes written inline on each node
//! - graph with a visual-builder `edges` list (`source`, `target`, `branch`)
//! - state table keyed by state name (`action`, `condition`, `next`, `on_fail`)

use super::node::{
    ActionNode, ConditionNode, DelayNode, Node, NodeId, RetryOverride, TerminalNode,
    TerminalOutcome,
};
use crate::condition::{ComparisonOperator, ConditionEvaluator, ConditionSpec, FieldComparison};
use crate::error::ValidationError;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

pub(crate) fn default_version() -> u32 {
    1
}

fn default_operator() -> String {
    "equals".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawCondition {
    Reference(String),
    Structured {
        field: String,
        #[serde(default = "default_operator")]
        operator: String,
        #[serde(default)]
        value: Value,
    },
}

impl RawCondition {
    fn resolve(
        &self,
        node_id: &str,
        conditions: &ConditionEvaluator,
    ) -> Result<ConditionSpec, ValidationError> {
        match self {
            Self::Reference(reference) => {
                conditions.resolve(reference).map_err(|error| match error {
                    ValidationError::UnregisteredCondition(condition) => {
                        ValidationError::UnknownCondition {
                            node_id: node_id.to_string(),
                            condition,
                        }
                    }
                    other => other,
                })
            }
            Self::Structured {
                field,
                operator,
                value,
            } => {
                let parsed = ComparisonOperator::parse(operator).ok_or_else(|| {
                    ValidationError::InvalidExpression {
                        expression: format!("{field} {operator} {value}"),
                        reason: format!("unknown operator '{operator}'"),
                    }
                })?;
                Ok(ConditionSpec::Comparison(FieldComparison::new(
                    field.clone(),
                    parsed,
                    value.clone(),
                )))
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawGraph {
    pub id: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub entry: Option<String>,
    pub nodes: Vec<RawNode>,
    #[serde(default)]
    pub edges: Vec<RawEdge>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub activity: Option<String>,
    pub on_success: Option<String>,
    pub on_failure: Option<String>,
    pub condition: Option<RawCondition>,
    pub on_true: Option<String>,
    pub on_false: Option<String>,
    pub default: Option<String>,
    pub delay_ms: Option<u64>,
    pub delay_seconds: Option<u64>,
    pub next: Option<String>,
    pub outcome: Option<String>,
    pub retry: Option<RetryOverride>,
    pub timeout_ms: Option<u64>,
    pub compensate: Option<String>,
    #[serde(default)]
    pub is_start: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawEdge {
    pub source: String,
    pub target: String,
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawTable {
    pub id: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub entry: String,
    pub states: BTreeMap<String, RawState>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawState {
    pub action: Option<String>,
    pub condition: Option<RawCondition>,
    pub next: Option<String>,
    pub on_fail: Option<String>,
    pub delay_ms: Option<u64>,
    pub delay_seconds: Option<u64>,
    pub terminal: Option<String>,
    pub retry: Option<RetryOverride>,
    pub timeout_ms: Option<u64>,
    pub compensate: Option<String>,
}

fn delay_from(delay_ms: Option<u64>, delay_seconds: Option<u64>) -> Option<Duration> {
    delay_ms
        .map(Duration::from_millis)
        .or_else(|| delay_seconds.map(Duration::from_secs))
}

fn parse_outcome(node_id: &str, raw: Option<&str>) -> Result<TerminalOutcome, ValidationError> {
    match raw.unwrap_or("success") {
        "success" | "completed" => Ok(TerminalOutcome::Success),
        "failure" | "failed" => Ok(TerminalOutcome::Failure),
        other => Err(ValidationError::Malformed(format!(
            "terminal node {node_id} has unknown outcome '{other}'"
        ))),
    }
}

fn set_route(
    slot: &mut Option<String>,
    node_id: &str,
    route: &str,
    target: String,
) -> Result<(), ValidationError> {
    match slot {
        Some(existing) if *existing != target => Err(ValidationError::Malformed(format!(
            "node {node_id} has conflicting {route} routes: {existing} and {target}"
        ))),
        _ => {
            *slot = Some(target);
            Ok(())
        }
    }
}

impl RawNode {
    fn apply_edge(&mut self, branch: Option<&str>, target: String) -> Result<(), ValidationError> {
        let node_id = self.id.clone();
        let invalid = |branch: &str, node_type: &str| ValidationError::InvalidEdgeBranch {
            node_id: node_id.clone(),
            branch: branch.to_string(),
            node_type: node_type.to_string(),
        };

        match self.node_type.as_str() {
            "action" => match branch.unwrap_or("success") {
                "success" => set_route(&mut self.on_success, &node_id, "on_success", target),
                "failure" => set_route(&mut self.on_failure, &node_id, "on_failure", target),
                other => Err(invalid(other, "action")),
            },
            "condition" => match branch.unwrap_or("true") {
                "true" => set_route(&mut self.on_true, &node_id, "on_true", target),
                "false" => set_route(&mut self.on_false, &node_id, "on_false", target),
                "default" | "else" => set_route(&mut self.default, &node_id, "default", target),
                other => Err(invalid(other, "condition")),
            },
            "delay" => match branch.unwrap_or("next") {
                "next" => set_route(&mut self.next, &node_id, "next", target),
                other => Err(invalid(other, "delay")),
            },
            other => Err(invalid(branch.unwrap_or("next"), other)),
        }
    }

    fn compile(self, conditions: &ConditionEvaluator) -> Result<(NodeId, Node), ValidationError> {
        let node = match self.node_type.as_str() {
            "action" => {
                let activity = self.activity.ok_or_else(|| {
                    ValidationError::Malformed(format!("action node {} has no activity", self.id))
                })?;
                Node::Action(ActionNode {
                    activity,
                    on_success: self.on_success,
                    on_failure: self.on_failure,
                    retry: self.retry,
                    timeout: self.timeout_ms.map(Duration::from_millis),
                    compensate: self.compensate,
                })
            }
            "condition" => {
                let condition = self.condition.as_ref().ok_or_else(|| {
                    ValidationError::Malformed(format!(
                        "condition node {} has no condition",
                        self.id
                    ))
                })?;
                Node::Condition(ConditionNode {
                    condition: condition.resolve(&self.id, conditions)?,
                    on_true: self.on_true,
                    on_false: self.on_false,
                    default: self.default,
                })
            }
            "delay" => {
                let duration = delay_from(self.delay_ms, self.delay_seconds).ok_or_else(|| {
                    ValidationError::Malformed(format!("delay node {} has no duration", self.id))
                })?;
                let next = self
                    .next
                    .ok_or_else(|| ValidationError::DelayWithoutNext {
                        node_id: self.id.clone(),
                    })?;
                Node::Delay(DelayNode { duration, next })
            }
            "terminal" => Node::Terminal(TerminalNode {
                outcome: parse_outcome(&self.id, self.outcome.as_deref())?,
            }),
            other => {
                return Err(ValidationError::Malformed(format!(
                    "node {} has unknown type '{other}'",
                    self.id
                )))
            }
        };
        Ok((self.id, node))
    }
}

/// Compiled graph pieces: entry and node arena
pub(crate) type Compiled = (NodeId, BTreeMap<NodeId, Node>);

fn insert_unique(
    nodes: &mut BTreeMap<NodeId, Node>,
    node_id: NodeId,
    node: Node,
) -> Result<(), ValidationError> {
    if nodes.contains_key(&node_id) {
        return Err(ValidationError::DuplicateNode { node_id });
    }
    nodes.insert(node_id, node);
    Ok(())
}

impl RawGraph {
    pub fn compile(self, conditions: &ConditionEvaluator) -> Result<Compiled, ValidationError> {
        let RawGraph {
            id,
            entry,
            mut nodes,
            edges,
            ..
        } = self;

        let index: HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(position, node)| (node.id.clone(), position))
            .collect();
        if index.len() != nodes.len() {
            let mut seen = std::collections::HashSet::new();
            let duplicate = nodes
                .iter()
                .find(|node| !seen.insert(node.id.as_str()))
                .map(|node| node.id.clone())
                .unwrap_or_default();
            return Err(ValidationError::DuplicateNode {
                node_id: duplicate,
            });
        }

        for edge in edges {
            let position = *index
                .get(&edge.source)
                .ok_or_else(|| ValidationError::UnknownEdgeSource {
                    source_node: edge.source.clone(),
                })?;
            nodes[position].apply_edge(edge.branch.as_deref(), edge.target)?;
        }

        let entry = match entry {
            Some(entry) => entry,
            None => {
                let candidates: Vec<NodeId> = nodes
                    .iter()
                    .filter(|node| node.is_start)
                    .map(|node| node.id.clone())
                    .collect();
                match candidates.len() {
                    1 => candidates[0].clone(),
                    0 => {
                        return Err(ValidationError::MissingEntryDeclaration { definition_id: id })
                    }
                    _ => {
                        return Err(ValidationError::AmbiguousEntry {
                            definition_id: id,
                            candidates,
                        })
                    }
                }
            }
        };

        let mut compiled = BTreeMap::new();
        for raw in nodes {
            let (node_id, node) = raw.compile(conditions)?;
            insert_unique(&mut compiled, node_id, node)?;
        }
        Ok((entry, compiled))
    }
}

impl RawTable {
    pub fn compile(self, conditions: &ConditionEvaluator) -> Result<Compiled, ValidationError> {
        let mut nodes = BTreeMap::new();
        for (name, state) in self.states {
            for (node_id, node) in state.compile(&name, conditions)? {
                insert_unique(&mut nodes, node_id, node)?;
            }
        }
        Ok((self.entry, nodes))
    }
}

impl RawState {
    /// A state compiles to one node, or to a guard condition plus its action.
    fn compile(
        self,
        name: &str,
        conditions: &ConditionEvaluator,
    ) -> Result<Vec<(NodeId, Node)>, ValidationError> {
        if let Some(outcome) = self.terminal.as_deref() {
            return Ok(vec![(
                name.to_string(),
                Node::Terminal(TerminalNode {
                    outcome: parse_outcome(name, Some(outcome))?,
                }),
            )]);
        }

        if let Some(duration) = delay_from(self.delay_ms, self.delay_seconds) {
            let next = self.next.ok_or_else(|| ValidationError::DelayWithoutNext {
                node_id: name.to_string(),
            })?;
            return Ok(vec![(name.to_string(), Node::Delay(DelayNode { duration, next }))]);
        }

        let guard = self
            .condition
            .as_ref()
            .map(|condition| condition.resolve(name, conditions))
            .transpose()?;

        match (self.action, guard) {
            (Some(activity), None) => Ok(vec![(
                name.to_string(),
                Node::Action(ActionNode {
                    activity,
                    on_success: self.next,
                    on_failure: self.on_fail,
                    retry: self.retry,
                    timeout: self.timeout_ms.map(Duration::from_millis),
                    compensate: self.compensate,
                }),
            )]),
            (Some(activity), Some(condition)) => {
                let action_id = format!("{name}::action");
                Ok(vec![
                    (
                        name.to_string(),
                        Node::Condition(ConditionNode {
                            condition,
                            on_true: Some(action_id.clone()),
                            on_false: self.next.clone(),
                            default: None,
                        }),
                    ),
                    (
                        action_id,
                        Node::Action(ActionNode {
                            activity,
                            on_success: self.next,
                            on_failure: self.on_fail,
                            retry: self.retry,
                            timeout: self.timeout_ms.map(Duration::from_millis),
                            compensate: self.compensate,
                        }),
                    ),
                ])
            }
            (None, Some(condition)) => Ok(vec![(
                name.to_string(),
                Node::Condition(ConditionNode {
                    condition,
                    on_true: self.next,
                    on_false: self.on_fail,
                    default: None,
                }),
            )]),
            (None, None) => Err(ValidationError::Malformed(format!(
                "state {name} has no action, condition, delay or terminal outcome"
            ))),
        }
    }
}
