//! # Resilience
//!
//! Per-activity circuit breakers. When an activity keeps failing transiently the
//! step executor stops invoking it for a cool-down period and reports a
//! transient "circuit open" failure instead, which the retry policy then backs
//! off from like any other transient error.
//!
//! ## Usage
//!
//! ```rust
//! use workflow_orchestrator::resilience::{BreakerThresholds, CircuitBreaker};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let breaker = CircuitBreaker::new("send_email", BreakerThresholds::default());
//!
//! let sent = breaker
//!     .call(|| async { Ok::<_, std::io::Error>("queued") })
//!     .await?;
//! assert_eq!(sent, "queued");
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod manager;
pub mod metrics;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use config::{BreakerThresholds, CircuitBreakerConfig};
pub use manager::CircuitBreakerManager;
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
