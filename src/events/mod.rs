//! Run lifecycle events published by the engine over a tokio broadcast channel.

pub mod publisher;

pub use publisher::{names, EventPublisher, LifecycleEvent, PublishError};
