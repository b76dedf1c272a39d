//! # Orchestration Engine
//!
//! Drives workflow runs through their definitions one tick at a time.
//!
//! ## Tick
//!
//! A tick loads the run record and walks every node it can resolve without
//! waiting: action successes, condition branches and terminals. The record is
//! persisted after every node with `version + 1`, so a crash loses at most the
//! node in flight. The tick stops when:
//!
//! - a delay node or a retry backoff parks the run (`Suspended`)
//! - a terminal node finishes it (`Completed` / `Failed`)
//! - `max_steps_per_tick` nodes were evaluated (`Yielded`, an immediate
//!   continuation is scheduled so one long run cannot hog a worker)
//!
//! ## Concurrency
//!
//! There is no lock. Two workers ticking the same run both execute the node,
//! but only the first save of a version wins; the other receives
//! [`EngineError::ConcurrentModification`] and leaves no trace in the record.
//! Activities are therefore invoked at least once and must be idempotent for
//! `(run_id, node_id, attempt)`.

use crate::condition::ConditionEvaluator;
use crate::config::EngineConfig;
use crate::definition::{Node, NodeId, TerminalOutcome, WorkflowDefinition};
use crate::dispatch::{Continuation, Dispatcher};
use crate::error::{EngineError, EngineResult};
use crate::events::{names, EventPublisher, LifecycleEvent};
use crate::logging::log_run_operation;
use crate::models::{ExecutionContext, RunFailure, RunRecord, RunStats, StepOutcome};
use crate::orchestration::compensation;
use crate::orchestration::retry_policy::{ErrorKind, RetryDecision, RetryPolicy};
use crate::orchestration::step_executor::StepExecutor;
use crate::orchestration::types::{ActivityInvocation, StepResult, TickOutcome};
use crate::persistence::RunStore;
use crate::registry::{ActivityRegistry, DefinitionRegistry};
use crate::resilience::SystemCircuitBreakerMetrics;
use crate::state_machine::{transition, RunEvent, RunStatus};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// What the tick loop does after a node has been handled
enum Step {
    Continue(RunRecord),
    Stop(TickOutcome),
}

pub struct OrchestrationEngine {
    store: Arc<dyn RunStore>,
    dispatcher: Arc<dyn Dispatcher>,
    conditions: Arc<ConditionEvaluator>,
    definitions: DefinitionRegistry,
    executor: StepExecutor,
    retry_policy: RetryPolicy,
    events: EventPublisher,
    config: EngineConfig,
}

impl std::fmt::Debug for OrchestrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationEngine")
            .field("definitions", &self.definitions.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Builder for [`OrchestrationEngine`]
pub struct EngineBuilder {
    store: Arc<dyn RunStore>,
    dispatcher: Arc<dyn Dispatcher>,
    activities: Arc<dyn ActivityRegistry>,
    conditions: ConditionEvaluator,
    definitions: DefinitionRegistry,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new(
        store: Arc<dyn RunStore>,
        dispatcher: Arc<dyn Dispatcher>,
        activities: Arc<dyn ActivityRegistry>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            activities,
            conditions: ConditionEvaluator::new(),
            definitions: DefinitionRegistry::new(),
            config: EngineConfig::default(),
        }
    }

    pub fn conditions(mut self, conditions: ConditionEvaluator) -> Self {
        self.conditions = conditions;
        self
    }

    /// Share a definition registry with other engines in the process
    pub fn definitions(mut self, definitions: DefinitionRegistry) -> Self {
        self.definitions = definitions;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> EngineResult<OrchestrationEngine> {
        self.config.validate()?;

        let executor = StepExecutor::new(
            self.activities,
            self.config.circuit_breaker.clone(),
            self.config.default_step_timeout(),
        );

        info!(
            step_budget = self.config.step_budget,
            max_steps_per_tick = self.config.max_steps_per_tick,
            max_attempts = self.config.retry.max_attempts,
            "🚀 Orchestration engine initialized"
        );

        Ok(OrchestrationEngine {
            store: self.store,
            dispatcher: self.dispatcher,
            conditions: Arc::new(self.conditions),
            definitions: self.definitions,
            executor,
            retry_policy: RetryPolicy::new(self.config.retry.clone()),
            events: EventPublisher::new(self.config.events.channel_capacity),
            config: self.config,
        })
    }
}

impl OrchestrationEngine {
    pub fn builder(
        store: Arc<dyn RunStore>,
        dispatcher: Arc<dyn Dispatcher>,
        activities: Arc<dyn ActivityRegistry>,
    ) -> EngineBuilder {
        EngineBuilder::new(store, dispatcher, activities)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn conditions(&self) -> &ConditionEvaluator {
        &self.conditions
    }

    pub fn definitions(&self) -> &DefinitionRegistry {
        &self.definitions
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub async fn circuit_metrics(&self) -> SystemCircuitBreakerMetrics {
        self.executor.breakers().system_metrics().await
    }

    /// Parse, validate and register a raw definition
    pub fn load_definition(&self, raw: Value) -> EngineResult<Arc<WorkflowDefinition>> {
        let definition = WorkflowDefinition::load(raw, &self.conditions)?;
        self.definitions.register(definition)
    }

    /// Start a run of `definition` with `initial_context`.
    ///
    /// The definition is validated and registered under `id@version`; the run
    /// keeps using that version for its whole life.
    #[instrument(skip(self, definition, initial_context), fields(definition = %definition.key()))]
    pub async fn start(
        &self,
        definition: WorkflowDefinition,
        initial_context: ExecutionContext,
    ) -> EngineResult<Uuid> {
        definition.validate(&self.conditions)?;
        let definition = self.definitions.register(definition)?;
        self.start_registered(&definition, initial_context).await
    }

    /// Start a run of an already registered definition; `None` picks the latest version
    pub async fn start_by_id(
        &self,
        definition_id: &str,
        version: Option<u32>,
        initial_context: ExecutionContext,
    ) -> EngineResult<Uuid> {
        let definition = match version {
            Some(version) => self
                .definitions
                .get(&crate::definition::DefinitionKey::new(definition_id, version)),
            None => self.definitions.latest(definition_id),
        }
        .ok_or_else(|| EngineError::DefinitionNotFound {
            definition_id: definition_id.to_string(),
            version: version.unwrap_or(0),
        })?;
        self.start_registered(&definition, initial_context).await
    }

    async fn start_registered(
        &self,
        definition: &WorkflowDefinition,
        initial_context: ExecutionContext,
    ) -> EngineResult<Uuid> {
        let record = RunRecord::new(definition, initial_context).next_version();
        self.store.save(&record, 0).await?;

        log_run_operation(
            "start",
            record.run_id,
            Some(&record.current_node),
            &record.status.to_string(),
            None,
        );
        self.emit(
            names::RUN_STARTED,
            &record,
            None,
            json!({"definition": definition.key().to_string()}),
        );
        // The run is durable from here on; a lost first tick is picked up by
        // `recover_runs`, so the caller still gets the id.
        if let Err(error) = self.schedule(&record, Duration::ZERO).await {
            warn!(
                run_id = %record.run_id,
                error = %error,
                "First tick not scheduled, run left pending for recovery"
            );
        }

        Ok(record.run_id)
    }

    /// Advance a run as far as it can go without waiting
    #[instrument(skip(self))]
    pub async fn tick(&self, run_id: Uuid) -> EngineResult<TickOutcome> {
        let record = self.load(run_id).await?;
        self.advance(record).await
    }

    /// Tick on behalf of a dispatcher delivery. A continuation whose version no
    /// longer matches the record is stale and is rejected without changes.
    #[instrument(skip(self), fields(run_id = %continuation.run_id, version = continuation.version))]
    pub async fn resume(&self, continuation: Continuation) -> EngineResult<TickOutcome> {
        let record = self.load(continuation.run_id).await?;
        if record.version != continuation.version {
            debug!(
                expected = continuation.version,
                actual = record.version,
                "Stale continuation"
            );
            return Err(EngineError::ConcurrentModification {
                run_id: continuation.run_id,
                expected: continuation.version,
                actual: record.version,
            });
        }
        self.advance(record).await
    }

    /// Cancel a run. Ticks already in flight lose their version check; later
    /// ticks observe the status at entry.
    #[instrument(skip(self))]
    pub async fn cancel(&self, run_id: Uuid) -> EngineResult<RunRecord> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.load(run_id).await?;
            if current.status == RunStatus::Cancelled {
                return Ok(current);
            }

            let mut next = current.next_version();
            next.status = transition(current.status, RunEvent::Cancel).map_err(|_| {
                EngineError::RunFinished {
                    run_id,
                    status: current.status,
                }
            })?;
            next.resume_at = None;
            next.history.record(
                next.current_node.clone(),
                next.current_attempt,
                StepOutcome::Cancelled,
            );

            match self.store.save(&next, current.version).await {
                Ok(()) => {
                    info!(run_id = %run_id, version = next.version, "🛑 Run cancelled");
                    self.emit(names::RUN_CANCELLED, &next, None, Value::Null);
                    return Ok(next);
                }
                Err(error) => {
                    let error = EngineError::from(error);
                    if !error.is_concurrent_modification()
                        || attempt >= self.config.conflict_retry_limit
                    {
                        return Err(error);
                    }
                    debug!(run_id = %run_id, attempt, "Cancel raced with a tick, retrying");
                }
            }
        }
    }

    pub async fn get_status(&self, run_id: Uuid) -> EngineResult<RunRecord> {
        self.load(run_id).await
    }

    pub async fn list_runs(&self, definition_id: &str, limit: usize) -> EngineResult<Vec<RunRecord>> {
        Ok(self.store.list_by_definition(definition_id, limit).await?)
    }

    /// Status counts, success rate and timing over the `limit` most recently
    /// updated runs of a definition
    pub async fn run_stats(&self, definition_id: &str, limit: usize) -> EngineResult<RunStats> {
        let runs = self.store.list_by_definition(definition_id, limit).await?;
        Ok(RunStats::from_records(definition_id, &runs))
    }

    /// Schedule a continuation for every unfinished run of a definition.
    /// Used after a restart, when continuations held only by an in-process
    /// dispatcher were lost.
    pub async fn recover_runs(&self, definition_id: &str, limit: usize) -> EngineResult<usize> {
        let runs = self.store.list_by_definition(definition_id, limit).await?;
        let now = Utc::now();
        let mut scheduled = 0;
        for record in runs.iter().filter(|record| !record.is_finished()) {
            let after = record
                .resume_at
                .and_then(|resume_at| (resume_at - now).to_std().ok())
                .unwrap_or(Duration::ZERO);
            self.schedule(record, after).await?;
            scheduled += 1;
        }
        info!(definition_id = %definition_id, scheduled, "♻️ Recovered unfinished runs");
        Ok(scheduled)
    }

    async fn load(&self, run_id: Uuid) -> EngineResult<RunRecord> {
        self.store
            .load(run_id)
            .await?
            .ok_or(EngineError::RunNotFound(run_id))
    }

    async fn advance(&self, mut current: RunRecord) -> EngineResult<TickOutcome> {
        match current.status {
            RunStatus::Cancelled => return Ok(TickOutcome::Cancelled),
            status if status.is_terminal() => {
                return Ok(TickOutcome::AlreadyFinished { status })
            }
            _ => {}
        }

        let now = Utc::now();
        if let Some(resume_at) = current.resume_at {
            if resume_at > now {
                let remaining = (resume_at - now).to_std().unwrap_or_default();
                debug!(run_id = %current.run_id, remaining_ms = remaining.as_millis() as u64, "Tick before resume time");
                return Ok(TickOutcome::NotReady { remaining });
            }
        }

        // The snapshot taken at start, not the registry: any engine sharing the
        // store can advance the run, and a republished version never applies.
        let definition = Arc::clone(&current.definition);

        current.status = match current.status {
            RunStatus::Pending => transition(current.status, RunEvent::Start)?,
            RunStatus::Suspended => transition(current.status, RunEvent::Resume)?,
            status => status,
        };
        current.resume_at = None;

        let mut steps_this_tick = 0;
        loop {
            if steps_this_tick >= self.config.max_steps_per_tick {
                debug!(
                    run_id = %current.run_id,
                    node_id = %current.current_node,
                    steps = steps_this_tick,
                    "Tick step limit reached, yielding"
                );
                self.schedule(&current, Duration::ZERO).await?;
                return Ok(TickOutcome::Yielded {
                    node_id: current.current_node,
                });
            }
            steps_this_tick += 1;

            match self.step(&definition, current).await? {
                Step::Continue(next) => current = next,
                Step::Stop(outcome) => return Ok(outcome),
            }
        }
    }

    /// Evaluate the current node once and persist the result
    async fn step(&self, definition: &WorkflowDefinition, current: RunRecord) -> EngineResult<Step> {
        let expected = current.version;
        let mut next = current.next_version();

        if current.steps_taken >= self.config.step_budget {
            warn!(
                run_id = %current.run_id,
                budget = self.config.step_budget,
                "Step budget exhausted"
            );
            let failure = RunFailure::StepBudgetExceeded {
                budget: self.config.step_budget,
            };
            return self.fail_run(definition, next, expected, failure).await.map(Step::Stop);
        }

        let node_id = current.current_node.clone();
        let Some(node) = definition.node(&node_id) else {
            let failure = RunFailure::NodeNotFound { node_id };
            return self.fail_run(definition, next, expected, failure).await.map(Step::Stop);
        };

        next.record_visit(&node_id);
        let attempt = current.current_attempt;
        debug!(
            run_id = %current.run_id,
            node_id = %node_id,
            node_type = node.type_name(),
            attempt,
            version = expected,
            "Evaluating node"
        );

        match node {
            Node::Terminal(terminal) => {
                next.history.record(
                    node_id.clone(),
                    attempt,
                    StepOutcome::Terminal {
                        outcome: terminal.outcome,
                    },
                );
                match terminal.outcome {
                    TerminalOutcome::Success => {
                        next.status = transition(next.status, RunEvent::Complete)?;
                        self.store.save(&next, expected).await?;
                        info!(
                            run_id = %next.run_id,
                            node_id = %node_id,
                            steps_taken = next.steps_taken,
                            "✅ Run completed"
                        );
                        log_run_operation("complete", next.run_id, Some(&node_id), "completed", None);
                        self.emit(names::RUN_COMPLETED, &next, Some(&node_id), next.context.to_value());
                        Ok(Step::Stop(TickOutcome::Completed))
                    }
                    TerminalOutcome::Failure => {
                        let failure = RunFailure::TerminalFailure { node_id };
                        self.fail_run(definition, next, expected, failure)
                            .await
                            .map(Step::Stop)
                    }
                }
            }

            Node::Condition(condition) => {
                let result = match self.conditions.evaluate_spec(&condition.condition, &current.context) {
                    Ok(result) => result,
                    Err(_) => {
                        let failure = RunFailure::ConditionUnavailable {
                            node_id,
                            condition: condition.condition.to_string(),
                        };
                        return self.fail_run(definition, next, expected, failure).await.map(Step::Stop);
                    }
                };

                let Some(target) = condition.route(result) else {
                    let failure = RunFailure::UnresolvedBranch {
                        node_id,
                        outcome: result.to_string(),
                    };
                    return self.fail_run(definition, next, expected, failure).await.map(Step::Stop);
                };

                next.history.record(
                    node_id.clone(),
                    attempt,
                    StepOutcome::BranchTaken {
                        result,
                        target: target.clone(),
                    },
                );
                next.move_to(target.clone());
                self.store.save(&next, expected).await?;
                debug!(run_id = %next.run_id, node_id = %node_id, result, target = %target, "Branch taken");
                Ok(Step::Continue(next))
            }

            Node::Delay(delay) => {
                let until = deadline(delay.duration);
                next.history
                    .record(node_id.clone(), attempt, StepOutcome::Delayed { until });
                next.move_to(delay.next.clone());
                next.resume_at = Some(until);
                next.status = transition(next.status, RunEvent::Suspend)?;
                self.store.save(&next, expected).await?;

                info!(
                    run_id = %next.run_id,
                    node_id = %node_id,
                    resume_at = %until,
                    "⏸️ Run suspended on delay"
                );
                self.emit(
                    names::RUN_SUSPENDED,
                    &next,
                    Some(&node_id),
                    json!({"resume_at": until, "next": delay.next}),
                );
                self.schedule(&next, delay.duration).await?;
                Ok(Step::Stop(TickOutcome::Suspended {
                    node_id: delay.next.clone(),
                    resume_after: delay.duration,
                }))
            }

            Node::Action(action) => {
                let invocation = ActivityInvocation {
                    run_id: current.run_id,
                    node_id: node_id.clone(),
                    attempt,
                    context: current.context.clone(),
                };
                let started = Instant::now();
                let result = self
                    .executor
                    .execute(&action.activity, &invocation, action.timeout)
                    .await;
                let elapsed = started.elapsed();

                let failure = match result {
                    StepResult::Success(partial) => {
                        next.context.merge(partial);
                        next.history
                            .record_timed(node_id.clone(), attempt, StepOutcome::Succeeded, elapsed);

                        let Some(target) = action.on_success.clone() else {
                            let failure = RunFailure::UnresolvedBranch {
                                node_id,
                                outcome: "success".to_string(),
                            };
                            return self.fail_run(definition, next, expected, failure).await.map(Step::Stop);
                        };
                        next.move_to(target);
                        self.store.save(&next, expected).await?;
                        self.emit(
                            names::STEP_COMPLETED,
                            &next,
                            Some(&node_id),
                            json!({"activity": action.activity, "attempt": attempt}),
                        );
                        return Ok(Step::Continue(next));
                    }

                    StepResult::TransientFailure { reason, retry_after } => {
                        next.history.record_timed(
                            node_id.clone(),
                            attempt,
                            StepOutcome::TransientFailure {
                                reason: reason.clone(),
                            },
                            elapsed,
                        );
                        let policy = self.retry_policy.with_override(action.retry.as_ref());
                        match policy.decide(attempt, &ErrorKind::Transient { retry_after }) {
                            RetryDecision::Retry { after } => {
                                return self
                                    .schedule_retry(next, expected, &node_id, attempt, after, &reason)
                                    .await
                                    .map(Step::Stop);
                            }
                            RetryDecision::GiveUp => RunFailure::RetriesExhausted {
                                node_id: node_id.clone(),
                                attempts: attempt,
                                reason,
                            },
                        }
                    }

                    StepResult::PermanentFailure { reason } => {
                        next.history.record_timed(
                            node_id.clone(),
                            attempt,
                            StepOutcome::PermanentFailure {
                                reason: reason.clone(),
                            },
                            elapsed,
                        );
                        RunFailure::ActivityPermanent {
                            node_id: node_id.clone(),
                            reason,
                        }
                    }
                };

                match action.on_failure.clone() {
                    Some(target) => {
                        next.move_to(target.clone());
                        self.store.save(&next, expected).await?;
                        warn!(
                            run_id = %next.run_id,
                            node_id = %node_id,
                            target = %target,
                            cause = %failure,
                            "Step failed, taking failure route"
                        );
                        self.emit(
                            names::STEP_FAILED,
                            &next,
                            Some(&node_id),
                            json!({"cause": failure, "routed_to": target}),
                        );
                        Ok(Step::Continue(next))
                    }
                    None => self
                        .fail_run(definition, next, expected, failure)
                        .await
                        .map(Step::Stop),
                }
            }
        }
    }

    async fn schedule_retry(
        &self,
        mut next: RunRecord,
        expected: u64,
        node_id: &NodeId,
        attempt: u32,
        after: Duration,
        reason: &str,
    ) -> EngineResult<TickOutcome> {
        next.history.record(
            node_id.clone(),
            attempt,
            StepOutcome::RetryScheduled {
                after_ms: after.as_millis() as u64,
            },
        );
        next.current_attempt = attempt + 1;
        next.resume_at = Some(deadline(after));
        next.status = transition(next.status, RunEvent::Suspend)?;
        self.store.save(&next, expected).await?;

        info!(
            run_id = %next.run_id,
            node_id = %node_id,
            attempt,
            retry_in_ms = after.as_millis() as u64,
            reason = %reason,
            "🔄 Retry scheduled"
        );
        self.emit(
            names::STEP_RETRY_SCHEDULED,
            &next,
            Some(node_id),
            json!({"attempt": attempt, "after_ms": after.as_millis() as u64, "reason": reason}),
        );
        self.schedule(&next, after).await?;

        Ok(TickOutcome::Suspended {
            node_id: node_id.clone(),
            resume_after: after,
        })
    }

    /// Compensate, then persist the run as `Failed`
    async fn fail_run(
        &self,
        definition: &WorkflowDefinition,
        mut next: RunRecord,
        expected: u64,
        failure: RunFailure,
    ) -> EngineResult<TickOutcome> {
        next.history.record(
            next.current_node.clone(),
            next.current_attempt,
            StepOutcome::RunFailed {
                failure: failure.clone(),
            },
        );

        let report = compensation::compensate(&self.executor, definition, &mut next).await;
        if !report.is_empty() {
            info!(
                run_id = %next.run_id,
                compensated = report.compensated.len(),
                failed = report.failed.len(),
                "Compensations finished"
            );
        }

        next.status = transition(next.status, RunEvent::Fail)?;
        next.resume_at = None;
        next.failure = Some(failure.clone());
        self.store.save(&next, expected).await?;

        warn!(
            run_id = %next.run_id,
            node_id = %next.current_node,
            cause = %failure,
            "❌ Run failed"
        );
        log_run_operation(
            "fail",
            next.run_id,
            Some(&next.current_node),
            "failed",
            Some(&failure.to_string()),
        );
        self.emit(
            names::RUN_FAILED,
            &next,
            Some(&next.current_node),
            json!({"failure": failure}),
        );

        Ok(TickOutcome::Failed { failure })
    }

    async fn schedule(&self, record: &RunRecord, after: Duration) -> EngineResult<()> {
        self.dispatcher
            .schedule_tick(
                Continuation {
                    run_id: record.run_id,
                    version: record.version,
                },
                after,
            )
            .await
            .map_err(|error| EngineError::Dispatch(error.to_string()))
    }

    fn emit(&self, name: &str, record: &RunRecord, node_id: Option<&str>, payload: Value) {
        if let Err(error) = self.events.publish(name, record.run_id, node_id, payload) {
            warn!(run_id = %record.run_id, event = name, error = %error, "Failed to publish lifecycle event");
        }
    }
}

fn deadline(after: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(after)
        .ok()
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
