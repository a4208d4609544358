use async_trait::async_trait;
use jobs_core::JobsResult;
use jobs_domain::events::{RunEventSink, RunStatusChanged};
use tokio::sync::broadcast;
use tracing::debug;

/// 基于广播通道的运行状态事件分发
///
/// 进程内的订阅者通过[`subscribe`](BroadcastEventSink::subscribe)获得
/// 接收端。没有订阅者时事件直接丢弃，发布方不受影响。
pub struct BroadcastEventSink {
    sender: broadcast::Sender<RunStatusChanged>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunStatusChanged> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl RunEventSink for BroadcastEventSink {
    async fn publish(&self, event: RunStatusChanged) -> JobsResult<()> {
        if self.sender.send(event).is_err() {
            debug!("当前没有事件订阅者，运行状态事件被丢弃");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobs_domain::entities::RunStatus;
    use jobs_testing_utils::RunBuilder;

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let sink = BroadcastEventSink::new(16);
        let mut receiver = sink.subscribe();

        let run = RunBuilder::new().with_status(RunStatus::Running).build();
        let event = RunStatusChanged::new(&run, Some(RunStatus::Queued), chrono::Utc::now());
        sink.publish(event.clone()).await.unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_id, event.event_id);
        assert_eq!(received.run_id, run.id);
        assert_eq!(received.old_status, Some(RunStatus::Queued));
        assert_eq!(received.new_status, RunStatus::Running);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let sink = BroadcastEventSink::new(16);
        let run = RunBuilder::new().build();

        let result = sink
            .publish(RunStatusChanged::new(&run, None, chrono::Utc::now()))
            .await;
        assert!(result.is_ok());
        assert_eq!(sink.receiver_count(), 0);
    }
}
