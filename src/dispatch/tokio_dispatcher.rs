use super::{Continuation, DispatchError, Dispatcher};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// In-process dispatcher: a delayed continuation is a sleeping tokio task that
/// pushes onto a bounded channel consumed by a [`Worker`](super::Worker).
///
/// Scheduled-but-undelivered continuations live only in memory. After a
/// restart, suspended runs are recovered from the run store instead.
#[derive(Debug, Clone)]
pub struct TokioDispatcher {
    sender: mpsc::Sender<Continuation>,
}

impl TokioDispatcher {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Continuation>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[async_trait]
impl Dispatcher for TokioDispatcher {
    async fn schedule_tick(&self, continuation: Continuation, after: Duration) -> Result<(), DispatchError> {
        if self.sender.is_closed() {
            return Err(DispatchError::Closed);
        }

        if after.is_zero() {
            return self
                .sender
                .send(continuation)
                .await
                .map_err(|_| DispatchError::Closed);
        }

        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if sender.send(continuation).await.is_err() {
                debug!(run_id = %continuation.run_id, "Dispatcher closed before delayed tick was delivered");
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_delivers_immediately_and_after_delay() {
        let (dispatcher, mut receiver) = TokioDispatcher::new(8);
        let run_id = Uuid::new_v4();

        dispatcher
            .schedule_tick(Continuation { run_id, version: 2 }, Duration::from_millis(30))
            .await
            .unwrap();
        dispatcher
            .schedule_tick(Continuation { run_id, version: 1 }, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(receiver.recv().await.unwrap().version, 1);
        assert_eq!(receiver.recv().await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_closed_receiver_is_reported() {
        let (dispatcher, receiver) = TokioDispatcher::new(1);
        drop(receiver);
        let result = dispatcher
            .schedule_tick(
                Continuation {
                    run_id: Uuid::new_v4(),
                    version: 1,
                },
                Duration::ZERO,
            )
            .await;
        assert!(matches!(result, Err(DispatchError::Closed)));
    }
}
