//! PostgreSQL run store.
//!
//! One row per run in `workflow_runs`; the full record is kept as `JSON` text
//! next to the columns the store filters on. `JSONB` would re-sort object keys
//! and lose the context's insertion order. Updates are guarded by
//! `WHERE version = $expected`, so a stale writer affects zero rows.

use super::{RunStore, StoreError, StoreResult};
use crate::models::RunRecord;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_create_workflow_runs.sql");

#[derive(Debug, Clone)]
pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(database_url).await.map_err(backend)?;
        Ok(Self::new(pool))
    }

    /// Create the `workflow_runs` table if it does not exist
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn current_version(&self, run_id: Uuid) -> StoreResult<u64> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM workflow_runs WHERE run_id = $1")
                .bind(run_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        Ok(version.map(|v| v as u64).unwrap_or(0))
    }
}

fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

fn decode(row: &PgRow) -> StoreResult<RunRecord> {
    let record: String = row.try_get("record").map_err(backend)?;
    Ok(serde_json::from_str(&record)?)
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn load(&self, run_id: Uuid) -> StoreResult<Option<RunRecord>> {
        let row = sqlx::query("SELECT record::text AS record FROM workflow_runs WHERE run_id = $1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        match row {
            Some(row) => Ok(Some(decode(&row)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, record: &RunRecord, expected_version: u64) -> StoreResult<()> {
        let payload = serde_json::to_string(record)?;

        let rows_affected = if expected_version == 0 {
            sqlx::query(
                r#"
                INSERT INTO workflow_runs
                    (run_id, definition_id, definition_version, status, version, record, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6::json, $7, $8)
                ON CONFLICT (run_id) DO NOTHING
                "#,
            )
            .bind(record.run_id)
            .bind(&record.definition_id)
            .bind(i64::from(record.definition_version))
            .bind(record.status.to_string())
            .bind(record.version as i64)
            .bind(&payload)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await
            .map_err(backend)?
            .rows_affected()
        } else {
            sqlx::query(
                r#"
                UPDATE workflow_runs
                SET status = $2, version = $3, record = $4::json, updated_at = $5
                WHERE run_id = $1 AND version = $6
                "#,
            )
            .bind(record.run_id)
            .bind(record.status.to_string())
            .bind(record.version as i64)
            .bind(&payload)
            .bind(record.updated_at)
            .bind(expected_version as i64)
            .execute(&self.pool)
            .await
            .map_err(backend)?
            .rows_affected()
        };

        if rows_affected == 0 {
            let actual = self.current_version(record.run_id).await?;
            debug!(
                run_id = %record.run_id,
                expected = expected_version,
                actual = actual,
                "Version check rejected run save"
            );
            return Err(StoreError::ConcurrentModification {
                run_id: record.run_id,
                expected: expected_version,
                actual,
            });
        }

        Ok(())
    }

    async fn list_by_definition(&self, definition_id: &str, limit: usize) -> StoreResult<Vec<RunRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT record::text AS record FROM workflow_runs
            WHERE definition_id = $1
            ORDER BY updated_at DESC
            LIMIT $2
            "#,
        )
        .bind(definition_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(decode).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionEvaluator;
    use crate::definition::WorkflowDefinition;
    use crate::models::ExecutionContext;
    use serde_json::json;

    /// Connects to `DATABASE_URL`; returns `None` when no database is configured
    async fn store() -> Option<PgRunStore> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let store = PgRunStore::connect(&url).await.unwrap();
        store.migrate().await.unwrap();
        Some(store)
    }

    fn record(context: serde_json::Value) -> RunRecord {
        let definition = WorkflowDefinition::load(
            json!({
                "id": "pg_ordering",
                "version": 3_000_000_000u64,
                "entry": "done",
                "nodes": [{"id": "done", "type": "terminal", "outcome": "success"}]
            }),
            &ConditionEvaluator::new(),
        )
        .unwrap();
        RunRecord::new(&definition, ExecutionContext::from_value(context).unwrap()).next_version()
    }

    #[tokio::test]
    async fn test_round_trip_keeps_context_key_order() {
        let Some(store) = store().await else {
            return;
        };
        let record = record(json!({"zeta": 1, "alpha": 2, "mid": {"y": true, "b": false}}));
        store.save(&record, 0).await.unwrap();

        let loaded = store.load(record.run_id).await.unwrap().unwrap();
        let keys: Vec<&str> = loaded.context.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(loaded, record);
        assert_eq!(loaded.definition_version, 3_000_000_000);

        let stale = store.save(&record, 0).await.unwrap_err();
        assert!(matches!(stale, StoreError::ConcurrentModification { actual: 1, .. }));
    }
}
