//! # Registries
//!
//! - [`ActivityRegistry`]: activity name to executable unit, consumed by the step
//!   executor. [`InMemoryActivityRegistry`] is the in-process implementation.
//! - [`DefinitionRegistry`]: versioned workflow definitions keyed by `id@version`.

pub mod activity_registry;
pub mod definition_registry;

pub use activity_registry::{Activity, ActivityRegistry, FnActivity, InMemoryActivityRegistry};
pub use definition_registry::DefinitionRegistry;
