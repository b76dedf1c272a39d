use crate::definition::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Lifecycle event names
pub mod names {
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_SUSPENDED: &str = "run.suspended";
    pub const RUN_COMPLETED: &str = "run.completed";
    pub const RUN_FAILED: &str = "run.failed";
    pub const RUN_CANCELLED: &str = "run.cancelled";
    pub const STEP_COMPLETED: &str = "step.completed";
    pub const STEP_FAILED: &str = "step.failed";
    pub const STEP_RETRY_SCHEDULED: &str = "step.retry_scheduled";
}

/// Broadcast publisher for run lifecycle events.
///
/// Publishing never blocks the engine: with no subscribers the event is dropped,
/// and a slow subscriber lags rather than applying backpressure.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<LifecycleEvent>,
}

/// Event that has been published
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub name: String,
    pub run_id: Uuid,
    pub node_id: Option<NodeId>,
    pub payload: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(
        &self,
        name: &str,
        run_id: Uuid,
        node_id: Option<&str>,
        payload: Value,
    ) -> Result<(), PublishError> {
        let event = LifecycleEvent {
            name: name.to_string(),
            run_id,
            node_id: node_id.map(str::to_string),
            payload,
            published_at: chrono::Utc::now(),
        };

        // send() only fails when nobody is subscribed
        match self.sender.send(event) {
            Ok(_) | Err(broadcast::error::SendError(_)) => Ok(()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Event channel is closed")]
    ChannelClosed,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}
