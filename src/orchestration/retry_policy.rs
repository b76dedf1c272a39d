//! # Retry Policy
//!
//! Decides whether a failed activity attempt is retried and after how long.
//!
//! ## Backoff
//!
//! Exponential: `base_delay * multiplier^(attempt - 1)`, capped at `max_delay`.
//! A server-requested delay (`retry_after`, e.g. from a rate-limited API) replaces
//! the computed delay but is still capped.
//!
//! ## Attempt budget
//!
//! `attempt` is 1-based. The attempt that reaches `max_attempts` gives up, so
//! with the default of 3 the third transient failure is final.

use crate::definition::RetryOverride;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry and backoff settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    /// Total attempts per node visit, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds
    pub max_delay_ms: u64,
    /// Exponential growth factor between attempts
    pub multiplier: f64,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 300_000, // 5 minutes
            multiplier: 2.0,
        }
    }
}

/// Classification of a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Transient { retry_after: Option<Duration> },
    Permanent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { after: Duration },
    GiveUp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    config: RetryPolicyConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryPolicyConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(config: RetryPolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryPolicyConfig {
        &self.config
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Policy with a node's overrides applied on top of this one
    pub fn with_override(&self, overrides: Option<&RetryOverride>) -> Self {
        let Some(overrides) = overrides else {
            return self.clone();
        };
        Self::new(RetryPolicyConfig {
            max_attempts: overrides.max_attempts.unwrap_or(self.config.max_attempts),
            base_delay_ms: overrides.base_delay_ms.unwrap_or(self.config.base_delay_ms),
            max_delay_ms: overrides.max_delay_ms.unwrap_or(self.config.max_delay_ms),
            multiplier: self.config.multiplier,
        })
    }

    /// Decide what to do after `attempt` failed with `kind`
    pub fn decide(&self, attempt: u32, kind: &ErrorKind) -> RetryDecision {
        match kind {
            ErrorKind::Permanent => RetryDecision::GiveUp,
            ErrorKind::Transient { .. } if attempt >= self.config.max_attempts => {
                RetryDecision::GiveUp
            }
            ErrorKind::Transient { retry_after } => RetryDecision::Retry {
                after: match retry_after {
                    Some(requested) => (*requested).min(self.max_delay()),
                    None => self.backoff_for(attempt),
                },
            },
        }
    }

    /// Exponential delay after the given 1-based attempt
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = self.config.base_delay_ms as f64 * self.config.multiplier.powi(exponent);
        let capped = delay_ms.min(self.config.max_delay_ms as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    fn max_delay(&self) -> Duration {
        Duration::from_millis(self.config.max_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> ErrorKind {
        ErrorKind::Transient { retry_after: None }
    }

    #[test]
    fn test_exponential_backoff_with_cap() {
        let policy = RetryPolicy::new(RetryPolicyConfig {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            multiplier: 2.0,
        });

        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(800));
        assert_eq!(policy.backoff_for(5), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_for(60), Duration::from_millis(1_000));
    }

    #[test]
    fn test_third_attempt_gives_up_by_default() {
        let policy = RetryPolicy::default();

        assert!(matches!(
            policy.decide(1, &transient()),
            RetryDecision::Retry { .. }
        ));
        assert!(matches!(
            policy.decide(2, &transient()),
            RetryDecision::Retry { .. }
        ));
        assert_eq!(policy.decide(3, &transient()), RetryDecision::GiveUp);
    }

    #[test]
    fn test_permanent_errors_never_retry() {
        assert_eq!(
            RetryPolicy::default().decide(1, &ErrorKind::Permanent),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_server_requested_delay_is_capped() {
        let policy = RetryPolicy::default();
        let decision = policy.decide(
            1,
            &ErrorKind::Transient {
                retry_after: Some(Duration::from_secs(3_600)),
            },
        );
        assert_eq!(
            decision,
            RetryDecision::Retry {
                after: Duration::from_secs(300)
            }
        );

        let decision = policy.decide(
            1,
            &ErrorKind::Transient {
                retry_after: Some(Duration::from_secs(7)),
            },
        );
        assert_eq!(
            decision,
            RetryDecision::Retry {
                after: Duration::from_secs(7)
            }
        );
    }

    #[test]
    fn test_node_override() {
        let policy = RetryPolicy::default().with_override(Some(&RetryOverride {
            max_attempts: Some(1),
            base_delay_ms: None,
            max_delay_ms: None,
        }));
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.decide(1, &transient()), RetryDecision::GiveUp);
        assert_eq!(policy.config().base_delay_ms, 1_000);
    }
}
