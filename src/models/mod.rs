//! # Run Data Model
//!
//! - [`ExecutionContext`]: ordered key/value bag threaded through a run
//! - [`StepHistory`]: append-only record of every step outcome
//! - [`RunRecord`]: the persisted continuation of a run
//! - [`RunStats`]: on-demand aggregates over the runs of a definition

pub mod context;
pub mod history;
pub mod run_record;
pub mod run_stats;

pub use context::ExecutionContext;
pub use history::{StepHistory, StepOutcome, StepRecord};
pub use run_record::{RunFailure, RunRecord};
pub use run_stats::{NodeTiming, RunStats};
