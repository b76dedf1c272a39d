//! Field comparison expressions: `<path> <op> <literal>`.
//!
//! ```text
//! flag==true
//! lead.score >= 50
//! plan != "free"
//! tags contains vip
//! ```

use crate::error::ValidationError;
use crate::models::ExecutionContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Contains,
    NotContains,
}

impl ComparisonOperator {
    /// Parse either the symbolic or the named spelling of an operator
    pub fn parse(raw: &str) -> Option<Self> {
        let op = match raw.trim() {
            "==" | "=" | "equals" | "eq" => Self::Equals,
            "!=" | "<>" | "not_equals" | "ne" => Self::NotEquals,
            ">" | "greater_than" | "gt" => Self::GreaterThan,
            "<" | "less_than" | "lt" => Self::LessThan,
            ">=" | "greater_or_equal" | "gte" => Self::GreaterOrEqual,
            "<=" | "less_or_equal" | "lte" => Self::LessOrEqual,
            "contains" => Self::Contains,
            "not_contains" => Self::NotContains,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Equals => "==",
            Self::NotEquals => "!=",
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::GreaterOrEqual => ">=",
            Self::LessOrEqual => "<=",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
        }
    }
}

/// A parsed `<path> <op> <literal>` comparison against the context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldComparison {
    pub path: String,
    pub operator: ComparisonOperator,
    pub value: Value,
}

impl fmt::Display for FieldComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.path, self.operator.symbol(), self.value)
    }
}

/// Operator spellings tried at each position. Words need surrounding spaces,
/// `not_contains` precedes `contains`, and two-character symbols precede their
/// one-character prefixes.
const OPERATORS: [&str; 10] = [
    " not_contains ",
    " contains ",
    "==",
    "!=",
    "<>",
    ">=",
    "<=",
    ">",
    "<",
    "=",
];

impl FieldComparison {
    pub fn new(path: impl Into<String>, operator: ComparisonOperator, value: Value) -> Self {
        Self {
            path: path.into(),
            operator,
            value,
        }
    }

    /// Parse an expression. `Ok(None)` means the text contains no operator at all
    /// and is therefore a plain predicate name rather than a broken expression.
    pub fn parse(expression: &str) -> Result<Option<Self>, ValidationError> {
        let Some((path, operator, literal)) = split_expression(expression) else {
            return Ok(None);
        };

        let invalid = |reason: &str| ValidationError::InvalidExpression {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let path = path.trim();
        if path.is_empty() {
            return Err(invalid("missing field path"));
        }
        if !path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err(invalid("field path may only contain letters, digits, '_', '-' and '.'"));
        }

        let literal = literal.trim();
        if literal.is_empty() {
            return Err(invalid("missing comparison value"));
        }
        // Bare words are strings: `status==active`
        let value = serde_json::from_str(literal)
            .unwrap_or_else(|_| Value::String(literal.to_string()));

        Ok(Some(Self::new(path, operator, value)))
    }

    /// Evaluate against a context snapshot. A missing field only satisfies the
    /// negative operators.
    pub fn evaluate(&self, context: &ExecutionContext) -> bool {
        let Some(actual) = context.lookup(&self.path) else {
            return matches!(
                self.operator,
                ComparisonOperator::NotEquals | ComparisonOperator::NotContains
            );
        };

        match self.operator {
            ComparisonOperator::Equals => loose_eq(actual, &self.value),
            ComparisonOperator::NotEquals => !loose_eq(actual, &self.value),
            ComparisonOperator::GreaterThan => {
                compare(actual, &self.value) == Some(Ordering::Greater)
            }
            ComparisonOperator::LessThan => compare(actual, &self.value) == Some(Ordering::Less),
            ComparisonOperator::GreaterOrEqual => matches!(
                compare(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            ComparisonOperator::LessOrEqual => matches!(
                compare(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            ComparisonOperator::Contains => contains(actual, &self.value),
            ComparisonOperator::NotContains => !contains(actual, &self.value),
        }
    }
}

/// Split at the leftmost operator outside a double-quoted literal
fn split_expression(expression: &str) -> Option<(&str, ComparisonOperator, &str)> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (index, ch) in expression.char_indices() {
        if in_quotes {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_quotes = false,
                _ => {}
            }
            continue;
        }
        if ch == '"' {
            in_quotes = true;
            continue;
        }

        let rest = &expression[index..];
        if let Some(token) = OPERATORS.iter().find(|token| rest.starts_with(**token)) {
            let operator = ComparisonOperator::parse(token)?;
            return Some((
                &expression[..index],
                operator,
                &expression[index + token.len()..],
            ));
        }
    }
    None
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn loose_eq(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            matches!((as_number(actual), as_number(expected)), (Some(a), Some(b)) if a == b)
        }
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            s.eq_ignore_ascii_case(if *b { "true" } else { "false" })
        }
        _ => false,
    }
}

fn compare(actual: &Value, expected: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (as_number(actual), as_number(expected)) {
        return a.partial_cmp(&b);
    }
    match (actual, expected) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn contains(actual: &Value, needle: &Value) -> bool {
    match actual {
        Value::String(haystack) => match needle {
            Value::String(n) => haystack.contains(n.as_str()),
            other => haystack.contains(&other.to_string()),
        },
        Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
        Value::Object(map) => needle.as_str().is_some_and(|key| map.contains_key(key)),
        _ => false,
    }
}
