#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Workflow Orchestrator
//!
//! Durable execution engine for long-running, multi-step business processes.
//!
//! ## Overview
//!
//! A process is described once as a [`WorkflowDefinition`]: a directed graph (or
//! state table) of action, condition, delay and terminal nodes. Each run of a
//! definition is persisted as a [`RunRecord`] after every node, so a run survives
//! process restarts and can sleep for days on a delay node without holding a
//! thread.
//!
//! ## Architecture
//!
//! - [`OrchestrationEngine`] advances runs one tick at a time
//! - [`persistence::RunStore`] persists run records behind an optimistic version check
//! - [`dispatch::Dispatcher`] delivers continuations back to the engine after a delay
//! - [`registry::ActivityRegistry`] resolves activity names to business code
//! - [`condition::ConditionEvaluator`] evaluates branch predicates over the run context
//! - [`resilience`] guards activities with per-activity circuit breakers
//!
//! ## Run lifecycle
//!
//! ```text
//! Pending ─▶ Running ─▶ Suspended ─▶ Running ─▶ Completed | Failed | Cancelled
//! ```
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use workflow_orchestrator::{
//!     ExecutionContext, InMemoryActivityRegistry, InMemoryRunStore, OrchestrationEngine,
//!     RecordingDispatcher, RunStatus, StepResult, TickOutcome,
//! };
//!
//! # tokio_test::block_on(async {
//! let activities = InMemoryActivityRegistry::new();
//! activities.register_fn("greet", |_| async { StepResult::success_with(json!({"greeted": true})) });
//!
//! let engine = OrchestrationEngine::builder(
//!     Arc::new(InMemoryRunStore::new()),
//!     Arc::new(RecordingDispatcher::new()),
//!     Arc::new(activities),
//! )
//! .build()
//! .unwrap();
//!
//! let definition = engine
//!     .load_definition(json!({
//!         "id": "hello",
//!         "entry": "greet",
//!         "nodes": [
//!             {"id": "greet", "type": "action", "activity": "greet", "on_success": "done"},
//!             {"id": "done", "type": "terminal", "outcome": "success"}
//!         ]
//!     }))
//!     .unwrap();
//!
//! let run_id = engine
//!     .start_by_id(&definition.id, None, ExecutionContext::new())
//!     .await
//!     .unwrap();
//! assert_eq!(engine.tick(run_id).await.unwrap(), TickOutcome::Completed);
//! assert_eq!(engine.get_status(run_id).await.unwrap().status, RunStatus::Completed);
//! # });
//! ```

pub mod condition;
pub mod config;
pub mod definition;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod persistence;
pub mod registry;
pub mod resilience;
pub mod state_machine;

pub use condition::{ConditionEvaluator, ConditionSpec};
pub use config::{ConfigManager, EngineConfig};
pub use definition::{DefinitionKey, Node, NodeId, WorkflowDefinition};
pub use dispatch::{Continuation, Dispatcher, RecordingDispatcher, TokioDispatcher, Worker};
pub use error::{EngineError, EngineResult, ValidationError};
pub use events::{EventPublisher, LifecycleEvent};
pub use models::{ExecutionContext, RunFailure, RunRecord, RunStats, StepHistory, StepOutcome};
pub use orchestration::{
    ActivityInvocation, EngineBuilder, OrchestrationEngine, RetryPolicy, RetryPolicyConfig,
    StepResult, TickOutcome,
};
pub use persistence::{InMemoryRunStore, RunStore, StoreError};
#[cfg(feature = "postgres")]
pub use persistence::PgRunStore;
pub use registry::{Activity, ActivityRegistry, DefinitionRegistry, InMemoryActivityRegistry};
pub use state_machine::{RunEvent, RunStatus};
