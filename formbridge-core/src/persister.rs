//! Submission persister (spec §4.3, §4.6): an independent `submission.received`
//! bus subscriber that durably stores every accepted submission, retrying on
//! store failure and dead-lettering to `persist.dlq` once its own retry
//! budget (spec §6.4: 8 attempts, base 1s, cap 60s) is exhausted.
//!
//! This runs alongside, not inside, the ingest handler: ingest only
//! publishes the event (spec §4.2); turning it into a durable
//! [`crate::domain::Submission`] row is this subscriber's job, mirroring how
//! [`crate::orchestrator::Orchestrator`] is also just a `submission.received`
//! subscriber, not a step the ingest handler calls directly.

use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;

use crate::config::PersisterConfig;
use crate::domain::{CanonicalEvent, Submission, SubmissionStatus};
use crate::error::Result;
use crate::ports::event_bus::PersistDlqEntry;
use crate::ports::{EventBus, SubmissionStore};
use crate::retry;

/// Owns the persister's consume loop.
pub struct Persister {
    store: Arc<dyn SubmissionStore>,
    bus: Arc<dyn EventBus>,
    config: PersisterConfig,
}

impl Persister {
    pub fn new(store: Arc<dyn SubmissionStore>, bus: Arc<dyn EventBus>, config: PersisterConfig) -> Self {
        Self { store, bus, config }
    }

    /// Runs the consume loop until the bus stream ends (normally: forever).
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let mut events = self.bus.subscribe_submission_received().await?;

        while let Some(event) = events.next().await {
            if let Err(e) = self.persist_with_retry(&event).await {
                tracing::error!(error = %e, submission_id = %event.submission_id, "persist.dlq");
            }
        }

        Ok(())
    }

    /// Persists one event, retrying store failures per [`PersisterConfig`]
    /// before giving up and publishing to `persist.dlq`.
    async fn persist_with_retry(&self, event: &CanonicalEvent) -> Result<()> {
        let retry_config = self.config.as_retry_config();
        let mut attempt_number: u32 = 1;

        loop {
            match self.store.create_submission(submission_from_event(event)).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    if attempt_number >= retry_config.max_attempts {
                        self.bus
                            .publish_persist_dlq(&PersistDlqEntry {
                                event: event.clone(),
                                error: e.to_string(),
                                failed_at: Utc::now(),
                            })
                            .await?;
                        return Ok(());
                    }

                    let delay = retry::backoff_delay(&retry_config, attempt_number);
                    tracing::warn!(error = %e, attempt = attempt_number, submission_id = %event.submission_id, "persist attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt_number += 1;
                }
            }
        }
    }
}

/// Turns an accepted canonical event into the durable row stored for it
/// (spec §8 scenario 2: idempotent on `submission_id`, enforced by the
/// store, not here).
fn submission_from_event(event: &CanonicalEvent) -> Submission {
    Submission {
        submission_id: event.submission_id,
        tenant_id: event.tenant_id.clone(),
        form_id: event.form_id.clone(),
        schema_version: event.schema_version.clone(),
        source: event.source.clone(),
        payload: event.payload.clone(),
        submitted_at: event.submitted_at,
        ingested_at: event.ingested_at,
        client_ip: event.client_ip.clone(),
        requested_destinations: event.requested_destinations.clone(),
        status: SubmissionStatus::Received,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SubmissionId;
    use crate::inmemory::{InMemoryEventBus, InMemorySubmissionStore};

    fn event() -> CanonicalEvent {
        CanonicalEvent {
            submission_id: SubmissionId::new(),
            tenant_id: "tenant_1".to_string(),
            form_id: "contact".to_string(),
            schema_version: "1.0".to_string(),
            source: None,
            payload: serde_json::json!({"email": "a@b.com"}),
            submitted_at: Utc::now(),
            ingested_at: Utc::now(),
            client_ip: None,
            requested_destinations: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_persists_event_published_on_bus() {
        let store = Arc::new(InMemorySubmissionStore::new());
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::default());
        let persister = Arc::new(Persister::new(store.clone(), bus.clone(), PersisterConfig::default()));

        let handle = tokio::spawn(persister.run());

        let event = event();
        bus.publish_submission_received(&event).await.unwrap();

        for _ in 0..50 {
            if store.get_submission(&event.tenant_id, event.submission_id).await.unwrap().is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let stored = store.get_submission(&event.tenant_id, event.submission_id).await.unwrap();
        assert!(stored.is_some());
        handle.abort();
    }

    #[tokio::test]
    async fn test_is_idempotent_on_submission_id() {
        let store = InMemorySubmissionStore::new();
        let event = event();

        let first = store.create_submission(submission_from_event(&event)).await.unwrap();
        let second = store.create_submission(submission_from_event(&event)).await.unwrap();

        assert_eq!(first.submission_id, second.submission_id);
        assert_eq!(first.submitted_at, second.submitted_at);
    }
}
