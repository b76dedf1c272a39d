//! # Saga Compensation
//!
//! When a run fails, the action nodes that already succeeded may have left side
//! effects behind (a created project, a tagged lead). Nodes that declare a
//! `compensate` activity get it invoked, most recently completed first, so the
//! effects are unwound in reverse order.
//!
//! Compensation is best-effort: each compensation runs once, and a failure is
//! recorded in the step history without stopping the remaining ones.

use crate::definition::{Node, NodeId, WorkflowDefinition};
use crate::models::{RunRecord, StepOutcome};
use crate::orchestration::step_executor::StepExecutor;
use crate::orchestration::types::{ActivityInvocation, StepResult};
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompensationReport {
    pub compensated: Vec<NodeId>,
    pub failed: Vec<(NodeId, String)>,
}

impl CompensationReport {
    pub fn is_empty(&self) -> bool {
        self.compensated.is_empty() && self.failed.is_empty()
    }
}

/// Compensations owed by `record`, most recent first, one per node
pub fn pending_compensations<'a>(
    definition: &'a WorkflowDefinition,
    record: &RunRecord,
) -> Vec<(NodeId, &'a str)> {
    let mut seen = HashSet::new();
    record
        .history
        .succeeded_nodes_rev()
        .filter(|node_id| seen.insert((*node_id).clone()))
        .filter_map(|node_id| match definition.node(node_id) {
            Some(Node::Action(action)) => action
                .compensate
                .as_deref()
                .map(|activity| (node_id.clone(), activity)),
            _ => None,
        })
        .collect()
}

/// Invoke every pending compensation and append the outcomes to the history
pub async fn compensate(
    executor: &StepExecutor,
    definition: &WorkflowDefinition,
    record: &mut RunRecord,
) -> CompensationReport {
    let mut report = CompensationReport::default();

    for (node_id, activity) in pending_compensations(definition, record) {
        let invocation = ActivityInvocation {
            run_id: record.run_id,
            node_id: node_id.clone(),
            attempt: 1,
            context: record.context.clone(),
        };

        match executor.execute_unguarded(activity, &invocation).await {
            StepResult::Success(_) => {
                info!(
                    run_id = %record.run_id,
                    node_id = %node_id,
                    activity = %activity,
                    "↩️ Compensation completed"
                );
                record.history.record(
                    node_id.clone(),
                    1,
                    StepOutcome::Compensated {
                        activity: activity.to_string(),
                    },
                );
                report.compensated.push(node_id);
            }
            StepResult::TransientFailure { reason, .. } | StepResult::PermanentFailure { reason } => {
                warn!(
                    run_id = %record.run_id,
                    node_id = %node_id,
                    activity = %activity,
                    reason = %reason,
                    "Compensation failed"
                );
                record.history.record(
                    node_id.clone(),
                    1,
                    StepOutcome::CompensationFailed {
                        activity: activity.to_string(),
                        reason: reason.clone(),
                    },
                );
                report.failed.push((node_id, reason));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionEvaluator;
    use crate::models::ExecutionContext;
    use crate::registry::InMemoryActivityRegistry;
    use crate::resilience::CircuitBreakerConfig;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn saga() -> WorkflowDefinition {
        WorkflowDefinition::load(
            json!({
                "id": "lead_import",
                "entry": "create",
                "nodes": [
                    {"id": "create", "type": "action", "activity": "create_lead",
                     "compensate": "delete_lead", "on_success": "tag"},
                    {"id": "tag", "type": "action", "activity": "tag_lead",
                     "compensate": "untag_lead", "on_success": "notify"},
                    {"id": "notify", "type": "action", "activity": "notify", "on_success": "done"},
                    {"id": "done", "type": "terminal"}
                ]
            }),
            &ConditionEvaluator::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_pending_compensations_are_reverse_ordered_and_deduplicated() {
        let definition = saga();
        let mut record = RunRecord::new(&definition, ExecutionContext::new());
        record.history.record("create", 1, StepOutcome::Succeeded);
        record.history.record("tag", 1, StepOutcome::Succeeded);
        record.history.record("notify", 1, StepOutcome::Succeeded);
        record.history.record("tag", 1, StepOutcome::Succeeded);

        let pending = pending_compensations(&definition, &record);
        assert_eq!(
            pending,
            vec![
                ("tag".to_string(), "untag_lead"),
                ("create".to_string(), "delete_lead")
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_compensation_does_not_stop_the_rest() {
        let definition = saga();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let registry = InMemoryActivityRegistry::new();
        for (name, result) in [
            ("untag_lead", StepResult::permanent("crm offline")),
            ("delete_lead", StepResult::success()),
        ] {
            let calls = Arc::clone(&calls);
            registry.register_fn(name, move |_| {
                let calls = Arc::clone(&calls);
                let result = result.clone();
                async move {
                    calls.lock().push(name);
                    result
                }
            });
        }
        let executor = StepExecutor::new(
            Arc::new(registry),
            CircuitBreakerConfig::default(),
            Duration::from_secs(1),
        );

        let mut record = RunRecord::new(&definition, ExecutionContext::new());
        record.history.record("create", 1, StepOutcome::Succeeded);
        record.history.record("tag", 1, StepOutcome::Succeeded);

        let report = compensate(&executor, &definition, &mut record).await;

        assert_eq!(*calls.lock(), vec!["untag_lead", "delete_lead"]);
        assert_eq!(report.compensated, vec!["create".to_string()]);
        assert_eq!(report.failed, vec![("tag".to_string(), "crm offline".to_string())]);
        assert!(matches!(
            record.history.last().map(|r| &r.outcome),
            Some(StepOutcome::Compensated { activity }) if activity == "delete_lead"
        ));
    }
}
