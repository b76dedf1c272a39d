use super::{RunStore, StoreError, StoreResult};
use crate::models::RunRecord;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Process-local run store. The version check and the write happen under the
/// same shard lock, so two savers of one version cannot both win.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRunStore {
    runs: Arc<DashMap<Uuid, RunRecord>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn load(&self, run_id: Uuid) -> StoreResult<Option<RunRecord>> {
        Ok(self.runs.get(&run_id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, record: &RunRecord, expected_version: u64) -> StoreResult<()> {
        match self.runs.entry(record.run_id) {
            Entry::Occupied(mut occupied) => {
                let actual = occupied.get().version;
                if actual != expected_version {
                    return Err(StoreError::ConcurrentModification {
                        run_id: record.run_id,
                        expected: expected_version,
                        actual,
                    });
                }
                occupied.insert(record.clone());
                Ok(())
            }
            Entry::Vacant(vacant) => {
                if expected_version != 0 {
                    return Err(StoreError::ConcurrentModification {
                        run_id: record.run_id,
                        expected: expected_version,
                        actual: 0,
                    });
                }
                vacant.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn list_by_definition(&self, definition_id: &str, limit: usize) -> StoreResult<Vec<RunRecord>> {
        let mut runs: Vec<RunRecord> = self
            .runs
            .iter()
            .filter(|entry| entry.value().definition_id == definition_id)
            .map(|entry| entry.value().clone())
            .collect();
        runs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        runs.truncate(limit);
        Ok(runs)
    }
}
