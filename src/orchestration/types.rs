//! Shared orchestration types: step results and tick outcomes.

use crate::definition::NodeId;
use crate::models::{ExecutionContext, RunFailure};
use crate::state_machine::RunStatus;
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

/// What an activity invocation receives. Activities must be idempotent with
/// respect to `(run_id, node_id, attempt)`: the dispatcher delivers at least once.
#[derive(Debug, Clone)]
pub struct ActivityInvocation {
    pub run_id: Uuid,
    pub node_id: NodeId,
    pub attempt: u32,
    pub context: ExecutionContext,
}

impl ActivityInvocation {
    /// Stable key an activity can use to deduplicate its side effects
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}:{}", self.run_id, self.node_id, self.attempt)
    }
}

/// Classified result of one activity invocation
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// Partial context merged into the run's context
    Success(Map<String, Value>),
    /// Eligible for retry; `retry_after` is a server-requested delay
    TransientFailure {
        reason: String,
        retry_after: Option<Duration>,
    },
    /// Not retryable
    PermanentFailure { reason: String },
}

impl StepResult {
    /// Success with no context changes
    pub fn success() -> Self {
        Self::Success(Map::new())
    }

    /// Success merging `output` into the context. Non-object output is stored
    /// under the `result` key.
    pub fn success_with(output: Value) -> Self {
        match output {
            Value::Object(map) => Self::Success(map),
            Value::Null => Self::success(),
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                Self::Success(map)
            }
        }
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self::TransientFailure {
            reason: reason.into(),
            retry_after: None,
        }
    }

    pub fn transient_after(reason: impl Into<String>, retry_after: Duration) -> Self {
        Self::TransientFailure {
            reason: reason.into(),
            retry_after: Some(retry_after),
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::PermanentFailure {
            reason: reason.into(),
        }
    }

    /// Unclassified errors are treated as transient: retrying is the
    /// conservative choice when the cause is unknown.
    pub fn from_error(error: anyhow::Error) -> Self {
        Self::transient(format!("{error:#}"))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::TransientFailure { reason, .. } | Self::PermanentFailure { reason } => {
                Some(reason)
            }
        }
    }
}

impl From<anyhow::Result<Value>> for StepResult {
    fn from(result: anyhow::Result<Value>) -> Self {
        match result {
            Ok(output) => Self::success_with(output),
            Err(error) => Self::from_error(error),
        }
    }
}

/// Observable result of one tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Run is parked until `resume_after` elapses (delay node or retry backoff)
    Suspended {
        node_id: NodeId,
        resume_after: Duration,
    },
    /// Per-tick step limit reached; an immediate continuation was scheduled
    Yielded { node_id: NodeId },
    /// Delivered before the run's resume time; nothing changed
    NotReady { remaining: Duration },
    Completed,
    Failed { failure: RunFailure },
    Cancelled,
    /// Run had already finished before this tick; nothing changed
    AlreadyFinished { status: RunStatus },
}

impl TickOutcome {
    /// Whether the run is finished after this tick
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed { .. } | Self::Cancelled | Self::AlreadyFinished { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_with_wraps_scalars() {
        let StepResult::Success(map) = StepResult::success_with(json!(42)) else {
            panic!("expected success");
        };
        assert_eq!(map.get("result"), Some(&json!(42)));
        assert_eq!(StepResult::success_with(Value::Null), StepResult::success());
    }

    #[test]
    fn test_anyhow_errors_are_transient() {
        let result: StepResult = Err::<Value, _>(anyhow::anyhow!("smtp unavailable")).into();
        assert_eq!(result.reason(), Some("smtp unavailable"));
        assert!(matches!(result, StepResult::TransientFailure { .. }));
    }

    #[test]
    fn test_idempotency_key() {
        let invocation = ActivityInvocation {
            run_id: Uuid::nil(),
            node_id: "send".to_string(),
            attempt: 2,
            context: ExecutionContext::new(),
        };
        assert_eq!(
            invocation.idempotency_key(),
            "00000000-0000-0000-0000-000000000000:send:2"
        );
    }
}
