//! # Run Persistence
//!
//! [`RunStore`] is the engine's only durable state. A run record is written with
//! an optimistic version check: `save(record, expected_version)` succeeds only
//! when the stored version still equals `expected_version` (0 for a record that
//! has never been saved). That check is the sole mutual exclusion between
//! workers ticking the same run.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use crate::error::EngineError;
use crate::models::RunRecord;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub use memory::InMemoryRunStore;
#[cfg(feature = "postgres")]
pub use postgres::PgRunStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored version moved since the caller loaded the record
    #[error("Concurrent modification of run {run_id}: expected version {expected}, found {actual}")]
    ConcurrentModification {
        run_id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("Run store backend error: {0}")]
    Backend(String),

    #[error("Run record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for EngineError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::ConcurrentModification {
                run_id,
                expected,
                actual,
            } => EngineError::ConcurrentModification {
                run_id,
                expected,
                actual,
            },
            other => EngineError::Store(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn load(&self, run_id: Uuid) -> StoreResult<Option<RunRecord>>;

    /// Persist `record`, whose `version` must be `expected_version + 1`
    async fn save(&self, record: &RunRecord, expected_version: u64) -> StoreResult<()>;

    /// Most recently updated runs of a definition, newest first
    async fn list_by_definition(&self, definition_id: &str, limit: usize) -> StoreResult<Vec<RunRecord>>;
}
