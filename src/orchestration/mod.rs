//! # Orchestration
//!
//! The run-driving core: the engine and the collaborators it delegates to.
//!
//! ## Core Components
//!
//! - **OrchestrationEngine**: ticks runs through their definitions, persisting
//!   after every node and suspending on delays and retry backoff
//! - **StepExecutor**: invokes activities under timeout and circuit breaker and
//!   classifies their outcome
//! - **RetryPolicy**: decides between retrying after a backoff and giving up
//! - **Compensation**: unwinds completed steps of a failed run in reverse order

pub mod compensation;
pub mod engine;
pub mod retry_policy;
pub mod step_executor;
pub mod types;

pub use compensation::CompensationReport;
pub use engine::{EngineBuilder, OrchestrationEngine};
pub use retry_policy::{ErrorKind, RetryDecision, RetryPolicy, RetryPolicyConfig};
pub use step_executor::StepExecutor;
pub use types::{ActivityInvocation, StepResult, TickOutcome};
