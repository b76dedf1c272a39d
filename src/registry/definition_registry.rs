//! Versioned store of loaded workflow definitions.
//!
//! `start` and `start_by_id` resolve definitions here. A started run carries its
//! own snapshot of the version it began with, so publishing a new version never
//! changes the graph under a run that is already in flight.

use crate::definition::{DefinitionKey, WorkflowDefinition};
use crate::error::{EngineError, EngineResult};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default, Clone)]
pub struct DefinitionRegistry {
    definitions: Arc<DashMap<DefinitionKey, Arc<WorkflowDefinition>>>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition version. Re-registering identical content is a
    /// no-op; different content under an existing key is rejected.
    pub fn register(&self, definition: WorkflowDefinition) -> EngineResult<Arc<WorkflowDefinition>> {
        let key = definition.key();
        if let Some(existing) = self.definitions.get(&key) {
            if **existing == definition {
                return Ok(Arc::clone(existing.value()));
            }
            return Err(EngineError::DefinitionConflict {
                definition_id: key.id,
                version: key.version,
            });
        }

        let definition = Arc::new(definition);
        let stored = self
            .definitions
            .entry(key.clone())
            .or_insert_with(|| Arc::clone(&definition))
            .value()
            .clone();
        if *stored != *definition {
            return Err(EngineError::DefinitionConflict {
                definition_id: key.id,
                version: key.version,
            });
        }
        info!(definition = %key, nodes = stored.nodes.len(), "📚 Definition registered");
        Ok(stored)
    }

    pub fn get(&self, key: &DefinitionKey) -> Option<Arc<WorkflowDefinition>> {
        self.definitions.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Highest registered version of a definition id
    pub fn latest(&self, definition_id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.definitions
            .iter()
            .filter(|entry| entry.key().id == definition_id)
            .max_by_key(|entry| entry.key().version)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn versions(&self, definition_id: &str) -> Vec<u32> {
        let mut versions: Vec<u32> = self
            .definitions
            .iter()
            .filter(|entry| entry.key().id == definition_id)
            .map(|entry| entry.key().version)
            .collect();
        versions.sort_unstable();
        versions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
