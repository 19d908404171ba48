use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::domain::CanonicalEvent;
use crate::error::Result;
use crate::ports::event_bus::{DeliverDlqEntry, PersistDlqEntry, SubmissionClosed};
use crate::ports::EventBus;

/// An in-process pub/sub bus backed by `tokio::sync::broadcast` channels, one
/// per subject.
///
/// Every subscriber sees every published event; there is no consumer-group
/// semantics here (unlike a production NATS JetStream adapter). The
/// `submission.received` channel in particular is shared by both the
/// persister and the orchestrator, each holding its own receiver.
pub struct InMemoryEventBus {
    submission_received: broadcast::Sender<CanonicalEvent>,
    persist_dlq: broadcast::Sender<PersistDlqEntry>,
    deliver_dlq: broadcast::Sender<DeliverDlqEntry>,
    submission_closed: broadcast::Sender<SubmissionClosed>,
}

impl InMemoryEventBus {
    pub fn new(capacity: usize) -> Self {
        let (submission_received, _) = broadcast::channel(capacity);
        let (persist_dlq, _) = broadcast::channel(capacity);
        let (deliver_dlq, _) = broadcast::channel(capacity);
        let (submission_closed, _) = broadcast::channel(capacity);
        Self { submission_received, persist_dlq, deliver_dlq, submission_closed }
    }

    /// Subscribes to `persist.dlq`, for tests and local inspection.
    pub fn subscribe_persist_dlq(&self) -> broadcast::Receiver<PersistDlqEntry> {
        self.persist_dlq.subscribe()
    }

    /// Subscribes to `deliver.dlq`, for tests and local inspection.
    pub fn subscribe_deliver_dlq(&self) -> broadcast::Receiver<DeliverDlqEntry> {
        self.deliver_dlq.subscribe()
    }

    /// Subscribes to `submission.closed`, for tests and local inspection.
    pub fn subscribe_submission_closed(&self) -> broadcast::Receiver<SubmissionClosed> {
        self.submission_closed.subscribe()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish_submission_received(&self, event: &CanonicalEvent) -> Result<()> {
        // No receivers yet is not an error: subscribers may attach later.
        let _ = self.submission_received.send(event.clone());
        Ok(())
    }

    async fn subscribe_submission_received(&self) -> Result<BoxStream<'static, CanonicalEvent>> {
        let receiver = self.submission_received.subscribe();
        let stream = BroadcastStream::new(receiver).filter_map(|item| item.ok());
        Ok(Box::pin(stream))
    }

    async fn publish_persist_dlq(&self, entry: &PersistDlqEntry) -> Result<()> {
        let _ = self.persist_dlq.send(entry.clone());
        Ok(())
    }

    async fn publish_deliver_dlq(&self, entry: &DeliverDlqEntry) -> Result<()> {
        let _ = self.deliver_dlq.send(entry.clone());
        Ok(())
    }

    async fn publish_submission_closed(&self, event: &SubmissionClosed) -> Result<()> {
        let _ = self.submission_closed.send(event.clone());
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SubmissionId;
    use chrono::Utc;

    fn event() -> CanonicalEvent {
        CanonicalEvent {
            submission_id: SubmissionId::new(),
            tenant_id: "tenant_1".to_string(),
            form_id: "contact".to_string(),
            schema_version: "1.0".to_string(),
            source: None,
            payload: serde_json::json!({}),
            submitted_at: Utc::now(),
            ingested_at: Utc::now(),
            client_ip: None,
            requested_destinations: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_publish_then_subscribe_receives_event() {
        let bus = InMemoryEventBus::default();
        let mut stream = bus.subscribe_submission_received().await.unwrap();

        let event = event();
        bus.publish_submission_received(&event).await.unwrap();

        let received = futures::StreamExt::next(&mut stream).await.unwrap();
        assert_eq!(received.submission_id, event.submission_id);
    }

    #[tokio::test]
    async fn test_both_persister_and_orchestrator_subscriptions_see_the_event() {
        let bus = InMemoryEventBus::default();
        let mut persister_view = bus.subscribe_submission_received().await.unwrap();
        let mut orchestrator_view = bus.subscribe_submission_received().await.unwrap();

        let event = event();
        bus.publish_submission_received(&event).await.unwrap();

        let a = futures::StreamExt::next(&mut persister_view).await.unwrap();
        let b = futures::StreamExt::next(&mut orchestrator_view).await.unwrap();
        assert_eq!(a.submission_id, event.submission_id);
        assert_eq!(b.submission_id, event.submission_id);
    }

    #[tokio::test]
    async fn test_persist_dlq_roundtrip() {
        let bus = InMemoryEventBus::default();
        let mut dlq = bus.subscribe_persist_dlq();

        let entry = PersistDlqEntry { event: event(), error: "store unavailable".to_string(), failed_at: Utc::now() };
        bus.publish_persist_dlq(&entry).await.unwrap();

        let received = dlq.recv().await.unwrap();
        assert_eq!(received.event.submission_id, entry.event.submission_id);
    }
}
