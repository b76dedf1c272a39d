//! Workflow node variants.

use crate::condition::ConditionSpec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub type NodeId = String;

/// Per-node override of the engine's retry policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryOverride {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalOutcome {
    Success,
    Failure,
}

impl fmt::Display for TerminalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionNode {
    pub activity: String,
    pub on_success: Option<NodeId>,
    pub on_failure: Option<NodeId>,
    pub retry: Option<RetryOverride>,
    pub timeout: Option<Duration>,
    /// Activity invoked to undo this step if the run later fails
    pub compensate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionNode {
    pub condition: ConditionSpec,
    pub on_true: Option<NodeId>,
    pub on_false: Option<NodeId>,
    pub default: Option<NodeId>,
}

impl ConditionNode {
    /// Route for an evaluation result, falling back to `default`
    pub fn route(&self, result: bool) -> Option<&NodeId> {
        let branch = if result {
            self.on_true.as_ref()
        } else {
            self.on_false.as_ref()
        };
        branch.or(self.default.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayNode {
    pub duration: Duration,
    pub next: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalNode {
    pub outcome: TerminalOutcome,
}

/// One step of a workflow. Closed set so the engine matches exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Action(ActionNode),
    Condition(ConditionNode),
    Delay(DelayNode),
    Terminal(TerminalNode),
}

impl Node {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Action(_) => "action",
            Self::Condition(_) => "condition",
            Self::Delay(_) => "delay",
            Self::Terminal(_) => "terminal",
        }
    }

    /// Outgoing routes as `(route name, target)` pairs
    pub fn routes(&self) -> Vec<(&'static str, &NodeId)> {
        let mut routes = Vec::new();
        match self {
            Self::Action(action) => {
                routes.extend(action.on_success.as_ref().map(|t| ("on_success", t)));
                routes.extend(action.on_failure.as_ref().map(|t| ("on_failure", t)));
            }
            Self::Condition(condition) => {
                routes.extend(condition.on_true.as_ref().map(|t| ("on_true", t)));
                routes.extend(condition.on_false.as_ref().map(|t| ("on_false", t)));
                routes.extend(condition.default.as_ref().map(|t| ("default", t)));
            }
            Self::Delay(delay) => routes.push(("next", &delay.next)),
            Self::Terminal(_) => {}
        }
        routes
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}
