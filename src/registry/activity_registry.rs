//! # Activity Registry
//!
//! Resolves activity names used by action nodes to executable units.
//!
//! ## Usage
//!
//! ```rust
//! use workflow_orchestrator::orchestration::StepResult;
//! use workflow_orchestrator::registry::{ActivityRegistry, InMemoryActivityRegistry};
//! use serde_json::json;
//!
//! let registry = InMemoryActivityRegistry::new();
//! registry.register_fn("tag_lead", |invocation| async move {
//!     let email = invocation.context.get("email").cloned();
//!     StepResult::success_with(json!({"tagged": email.is_some()}))
//! });
//!
//! assert!(registry.resolve("tag_lead").is_some());
//! assert!(registry.resolve("missing").is_none());
//! ```

use crate::orchestration::types::{ActivityInvocation, StepResult};
use async_trait::async_trait;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Externally defined unit of work an action node delegates to
#[async_trait]
pub trait Activity: Send + Sync {
    async fn invoke(&self, invocation: &ActivityInvocation) -> StepResult;
}

/// Name to activity resolver consumed by the step executor
pub trait ActivityRegistry: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Activity>>;
}

/// Adapter turning an async closure into an [`Activity`]
pub struct FnActivity<F> {
    func: F,
}

impl<F> FnActivity<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> Activity for FnActivity<F>
where
    F: Fn(ActivityInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StepResult> + Send + 'static,
{
    async fn invoke(&self, invocation: &ActivityInvocation) -> StepResult {
        (self.func)(invocation.clone()).await
    }
}

/// Concurrent in-process registry; activities can be registered at any time
#[derive(Default, Clone)]
pub struct InMemoryActivityRegistry {
    activities: Arc<DashMap<String, Arc<dyn Activity>>>,
}

impl std::fmt::Debug for InMemoryActivityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryActivityRegistry")
            .field("activity_count", &self.activities.len())
            .finish()
    }
}

impl InMemoryActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, activity: Arc<dyn Activity>) {
        let name = name.into();
        debug!(activity = %name, "Registering activity");
        self.activities.insert(name, activity);
    }

    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, func: F)
    where
        F: Fn(ActivityInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StepResult> + Send + 'static,
    {
        self.register(name, Arc::new(FnActivity::new(func)));
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.activities.remove(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.activities.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}

impl ActivityRegistry for InMemoryActivityRegistry {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Activity>> {
        self.activities.get(name).map(|entry| Arc::clone(entry.value()))
    }
}
