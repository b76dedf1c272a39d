//! # Condition Evaluation
//!
//! Pure predicate evaluation over a context snapshot. A condition reference in a
//! definition resolves, at load time, to either a registered named predicate or a
//! field comparison expression (see [`expression`]). References that resolve to
//! neither are rejected before the run starts.
//!
//! ```rust
//! use workflow_orchestrator::condition::ConditionEvaluator;
//! use workflow_orchestrator::models::ExecutionContext;
//! use serde_json::json;
//!
//! let mut evaluator = ConditionEvaluator::new();
//! evaluator.register("is_vip", |ctx| ctx.get("tier") == Some(&json!("vip")));
//!
//! let context = ExecutionContext::from_value(json!({"tier": "vip", "score": 80})).unwrap();
//! assert!(evaluator.evaluate("is_vip", &context).unwrap());
//! assert!(evaluator.evaluate("score > 50", &context).unwrap());
//! ```

pub mod expression;

pub use expression::{ComparisonOperator, FieldComparison};

use crate::error::ValidationError;
use crate::models::ExecutionContext;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A registered predicate. Must only read the context it is given.
pub type Predicate = Arc<dyn Fn(&ExecutionContext) -> bool + Send + Sync>;

/// A condition resolved at definition-load time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionSpec {
    Named { name: String },
    Comparison(FieldComparison),
}

impl fmt::Display for ConditionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named { name } => f.write_str(name),
            Self::Comparison(comparison) => comparison.fmt(f),
        }
    }
}

#[derive(Clone, Default)]
pub struct ConditionEvaluator {
    predicates: HashMap<String, Predicate>,
}

impl fmt::Debug for ConditionEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.predicates.keys().collect();
        names.sort();
        f.debug_struct("ConditionEvaluator")
            .field("predicates", &names)
            .finish()
    }
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named predicate; a later registration under the same name wins.
    pub fn register<F>(&mut self, name: impl Into<String>, predicate: F) -> &mut Self
    where
        F: Fn(&ExecutionContext) -> bool + Send + Sync + 'static,
    {
        self.predicates.insert(name.into(), Arc::new(predicate));
        self
    }

    pub fn with_predicate<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&ExecutionContext) -> bool + Send + Sync + 'static,
    {
        self.register(name, predicate);
        self
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    /// Resolve a textual reference. Registered names take precedence over
    /// expression parsing so a predicate may be called `"score>10"` if desired.
    pub fn resolve(&self, reference: &str) -> Result<ConditionSpec, ValidationError> {
        let reference = reference.trim();
        if self.predicates.contains_key(reference) {
            return Ok(ConditionSpec::Named {
                name: reference.to_string(),
            });
        }
        match FieldComparison::parse(reference)? {
            Some(comparison) => Ok(ConditionSpec::Comparison(comparison)),
            None => Err(ValidationError::UnregisteredCondition(reference.to_string())),
        }
    }

    /// Evaluate a condition by name or expression
    pub fn evaluate(
        &self,
        reference: &str,
        context: &ExecutionContext,
    ) -> Result<bool, ValidationError> {
        let spec = self.resolve(reference)?;
        self.evaluate_spec(&spec, context)
    }

    /// Evaluate a condition resolved earlier by [`resolve`](Self::resolve)
    pub fn evaluate_spec(
        &self,
        spec: &ConditionSpec,
        context: &ExecutionContext,
    ) -> Result<bool, ValidationError> {
        match spec {
            ConditionSpec::Named { name } => self
                .predicates
                .get(name)
                .map(|predicate| predicate(context))
                .ok_or_else(|| ValidationError::UnregisteredCondition(name.clone())),
            ConditionSpec::Comparison(comparison) => Ok(comparison.evaluate(context)),
        }
    }

    /// Check that a previously resolved condition is still evaluable
    pub fn supports(&self, spec: &ConditionSpec) -> bool {
        match spec {
            ConditionSpec::Named { name } => self.predicates.contains_key(name),
            ConditionSpec::Comparison(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_named_predicates_take_precedence() {
        let evaluator = ConditionEvaluator::new().with_predicate("flag==true", |_| false);
        let context = ExecutionContext::from_value(json!({"flag": true})).unwrap();

        assert!(!evaluator.evaluate("flag==true", &context).unwrap());
    }

    #[test]
    fn test_unknown_names_fail() {
        let evaluator = ConditionEvaluator::new();
        let err = evaluator.resolve("has_opened_email").unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnregisteredCondition("has_opened_email".to_string())
        );
    }

    #[test]
    fn test_evaluation_does_not_touch_context() {
        let evaluator = ConditionEvaluator::new();
        let context = ExecutionContext::from_value(json!({"score": 5})).unwrap();
        let before = context.clone();

        assert!(evaluator.evaluate("score < 10", &context).unwrap());
        assert_eq!(context, before);
    }

    #[test]
    fn test_resolved_expression_round_trips_through_serde() {
        let evaluator = ConditionEvaluator::new();
        let spec = evaluator.resolve("lead.score >= 50").unwrap();
        let json = serde_json::to_value(&spec).unwrap();
        let back: ConditionSpec = serde_json::from_value(json).unwrap();
        assert_eq!(spec, back);
        assert_eq!(back.to_string(), "lead.score >= 50");
    }
}
