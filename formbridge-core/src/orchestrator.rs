//! Delivery orchestrator (spec §4.9): consumes `submission.received` events
//! and fans each out to every active destination configured for its tenant,
//! driving one [`DeliveryState`] state machine per (submission, destination)
//! pair through to a terminal outcome.
//!
//! Concurrency is bounded at three levels, mirroring spec §4.9/§5:
//! - globally, via `max_concurrent_events` in-flight submissions;
//! - per submission, via `per_submission_fanout` concurrent destination deliveries;
//! - per tenant, via `per_tenant_cap` across all of a tenant's in-flight deliveries.

use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::{OrchestratorConfig, RetryConfig};
use crate::connectors::Connector;
use crate::domain::{
    CanonicalEvent, DeliveryAttempt, DeliveryOutcome, DeliveryState, Destination, DestinationAuthMode,
    RetriableReason, TerminalReason,
};
use crate::error::Result;
use crate::ports::event_bus::{DeliverDlqEntry, SubmissionClosed};
use crate::ports::submission_store::derive_submission_status;
use crate::ports::{EventBus, SecretStore, SubmissionStore};
use crate::retry;

/// Owns the bounded worker pool driving delivery for every consumed event.
pub struct Orchestrator {
    store: Arc<dyn SubmissionStore>,
    secrets: Arc<dyn SecretStore>,
    bus: Arc<dyn EventBus>,
    connector: Arc<dyn Connector>,
    orchestrator_config: OrchestratorConfig,
    retry_config: RetryConfig,
    global_semaphore: Arc<Semaphore>,
    tenant_semaphores: dashmap_free::TenantSemaphores,
}

mod dashmap_free {
    //! A tiny per-tenant semaphore map. Named to flag that this deliberately
    //! avoids a `DashMap` dependency: entries are created lazily and never
    //! evicted, which is acceptable at Form-Bridge's tenant-count scale.
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Semaphore;

    #[derive(Default)]
    pub struct TenantSemaphores {
        inner: Mutex<HashMap<String, Arc<Semaphore>>>,
        permits: usize,
    }

    impl TenantSemaphores {
        pub fn new(permits: usize) -> Self {
            Self { inner: Mutex::new(HashMap::new()), permits }
        }

        pub fn get(&self, tenant_id: &str) -> Arc<Semaphore> {
            let mut map = self.inner.lock().expect("tenant semaphore map lock poisoned");
            map.entry(tenant_id.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.permits)))
                .clone()
        }
    }
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn SubmissionStore>,
        secrets: Arc<dyn SecretStore>,
        bus: Arc<dyn EventBus>,
        connector: Arc<dyn Connector>,
        orchestrator_config: OrchestratorConfig,
        retry_config: RetryConfig,
    ) -> Self {
        let global_semaphore = Arc::new(Semaphore::new(orchestrator_config.max_concurrent_events));
        let tenant_semaphores = dashmap_free::TenantSemaphores::new(orchestrator_config.per_tenant_cap);

        Self {
            store,
            secrets,
            bus,
            connector,
            orchestrator_config,
            retry_config,
            global_semaphore,
            tenant_semaphores,
        }
    }

    /// Runs the consume loop until the bus stream ends (normally: forever).
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let mut events = self.bus.subscribe_submission_received().await?;
        let mut tasks = JoinSet::new();

        while let Some(event) = events.next().await {
            let permit = self.global_semaphore.clone().acquire_owned().await.expect("semaphore never closed");
            let this = self.clone();

            tasks.spawn(async move {
                let _permit = permit;
                if let Err(e) = this.handle_event(event).await {
                    tracing::error!(error = %e, "submission fan-out failed");
                }
            });

            // Bound unbounded JoinSet growth: reap completed tasks as we go.
            while tasks.len() > self.orchestrator_config.max_concurrent_events {
                tasks.join_next().await;
            }
        }

        while tasks.join_next().await.is_some() {}
        Ok(())
    }

    /// Fans one event out to every active destination for its tenant (spec
    /// §4.9), then publishes `submission.closed` once every destination has
    /// reached a terminal outcome (step 5).
    async fn handle_event(&self, event: CanonicalEvent) -> Result<()> {
        let tenant_permit = self
            .tenant_semaphores
            .get(&event.tenant_id)
            .acquire_owned()
            .await
            .expect("semaphore never closed");

        let destinations = self.store.list_active_destinations(&event.tenant_id).await?;
        let fanout_semaphore = Arc::new(Semaphore::new(self.orchestrator_config.per_submission_fanout));

        let mut tasks = JoinSet::new();
        for destination in destinations {
            let permit = fanout_semaphore.clone().acquire_owned().await.expect("semaphore never closed");
            let event = event.clone();
            let this_store = self.store.clone();
            let this_secrets = self.secrets.clone();
            let this_connector = self.connector.clone();
            let this_bus = self.bus.clone();
            let retry_config = self.retry_config.clone();

            tasks.spawn(async move {
                let _permit = permit;
                deliver_with_retry(&*this_store, &*this_secrets, &*this_connector, &*this_bus, &retry_config, &event, &destination).await
            });
        }

        while let Some(result) = tasks.join_next().await {
            if let Ok(Err(e)) = result {
                tracing::warn!(error = %e, "delivery attempt failed");
            }
        }

        drop(tenant_permit);

        let attempts = self.store.list_delivery_attempts(event.submission_id).await?;
        if !attempts.is_empty() {
            let status = derive_submission_status(&attempts);
            self.bus
                .publish_submission_closed(&SubmissionClosed {
                    submission_id: event.submission_id,
                    tenant_id: event.tenant_id.clone(),
                    status,
                    closed_at: Utc::now(),
                })
                .await?;
        }

        Ok(())
    }
}

/// Resolves the secret a destination's outbound auth needs, or `None` when
/// `destination.auth.mode` is [`DestinationAuthMode::None`] (spec §4.8).
/// `destination.auth.secret_ref` overrides `destination.secret_ref` when set.
async fn resolve_outbound_secret(secrets: &dyn SecretStore, destination: &Destination) -> Result<Option<Vec<u8>>> {
    if destination.auth.mode == DestinationAuthMode::None {
        return Ok(None);
    }
    let secret_ref = destination.auth.secret_ref.as_deref().unwrap_or(&destination.secret_ref);
    Ok(Some(secrets.resolve(secret_ref).await?))
}

/// Drives one (submission, destination) delivery through the state machine
/// until it reaches `Succeeded` or `Failed` (spec §4.9 transition table).
/// Exactly one [`DeliveryAttempt`] row is persisted per `attempt_number`;
/// the intermediate `RateChecking`/`Invoking`/`Classifying` states are
/// transient and only logged, never stored.
async fn deliver_with_retry(
    store: &dyn SubmissionStore,
    secrets: &dyn SecretStore,
    connector: &dyn Connector,
    bus: &dyn EventBus,
    retry_config: &RetryConfig,
    event: &CanonicalEvent,
    destination: &Destination,
) -> Result<()> {
    let started_at = Utc::now();
    let mut attempt_number: u32 = 1;

    loop {
        tracing::debug!(submission_id = %event.submission_id, destination_id = %destination.destination_id, attempt_number, "invoking destination");

        let secret = resolve_outbound_secret(secrets, destination).await?;
        let outcome = connector.deliver(destination, event, secret.as_deref()).await?;

        let event_age = (Utc::now() - started_at).to_std().unwrap_or(Duration::ZERO);

        match outcome {
            DeliveryOutcome::Success { .. } => {
                record_terminal_state(store, event, destination, attempt_number, DeliveryState::Succeeded, None).await?;
                return Ok(());
            }
            DeliveryOutcome::Terminal { reason } => {
                record_terminal_state(
                    store,
                    event,
                    destination,
                    attempt_number,
                    DeliveryState::Failed,
                    Some(terminal_reason_code(reason)),
                )
                .await?;
                return Ok(());
            }
            DeliveryOutcome::Retriable { reason } => {
                if !retry::should_retry(retry_config, attempt_number, event_age) {
                    record_terminal_state(
                        store,
                        event,
                        destination,
                        attempt_number,
                        DeliveryState::Failed,
                        Some(retriable_reason_code(reason)),
                    )
                    .await?;
                    bus.publish_deliver_dlq(&DeliverDlqEntry {
                        submission_id: event.submission_id,
                        destination_id: destination.destination_id.clone(),
                        event: event.clone(),
                        reason: retriable_reason_code(reason).to_string(),
                        failed_at: Utc::now(),
                    })
                    .await?;
                    return Ok(());
                }

                let delay = retry::backoff_delay(retry_config, attempt_number);
                record_scheduling_retry(store, event, destination, attempt_number, reason, delay).await?;
                tokio::time::sleep(delay).await;
                attempt_number += 1;
            }
        }
    }
}

async fn record_terminal_state(
    store: &dyn SubmissionStore,
    event: &CanonicalEvent,
    destination: &Destination,
    attempt_number: u32,
    state: DeliveryState,
    error_kind: Option<&'static str>,
) -> Result<()> {
    let now = Utc::now();
    store
        .put_delivery_attempt(DeliveryAttempt {
            submission_id: event.submission_id,
            destination_id: destination.destination_id.clone(),
            attempt_number,
            state,
            last_error_kind: error_kind.map(|s| s.to_string()),
            last_attempted_at: Some(now),
            next_attempt_at: None,
            created_at: now,
            updated_at: now,
        })
        .await
}

async fn record_scheduling_retry(
    store: &dyn SubmissionStore,
    event: &CanonicalEvent,
    destination: &Destination,
    attempt_number: u32,
    reason: RetriableReason,
    delay: Duration,
) -> Result<()> {
    let now = Utc::now();
    let next_attempt_at = now + chrono::Duration::from_std(delay).unwrap_or_default();
    store
        .put_delivery_attempt(DeliveryAttempt {
            submission_id: event.submission_id,
            destination_id: destination.destination_id.clone(),
            attempt_number,
            state: DeliveryState::SchedulingRetry,
            last_error_kind: Some(retriable_reason_code(reason).to_string()),
            last_attempted_at: Some(now),
            next_attempt_at: Some(next_attempt_at),
            created_at: now,
            updated_at: now,
        })
        .await
}

fn retriable_reason_code(reason: RetriableReason) -> &'static str {
    match reason {
        RetriableReason::Network => "connector.network",
        RetriableReason::Timeout => "connector.timeout",
        RetriableReason::RequestTimeout => "connector.request_timeout",
        RetriableReason::Http5xx => "connector.http_5xx",
        RetriableReason::RateLimited => "connector.rate_limited",
    }
}

fn terminal_reason_code(reason: TerminalReason) -> &'static str {
    match reason {
        TerminalReason::Http4xx => "connector.http_4xx",
        TerminalReason::EventAgeExceeded => "orchestrator.event_age_exceeded",
        TerminalReason::DestinationDeleted => "orchestrator.destination_deleted",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DestinationAuth, DestinationMethod, SubmissionId};
    use crate::inmemory::{InMemoryEventBus, InMemorySecretStore, InMemorySubmissionStore};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingConnector {
        calls: AtomicU32,
        succeed_on_attempt: u32,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        async fn deliver(&self, _destination: &Destination, _event: &CanonicalEvent, _secret: Option<&[u8]>) -> Result<DeliveryOutcome> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.succeed_on_attempt {
                Ok(DeliveryOutcome::Success { status: 200 })
            } else {
                Ok(DeliveryOutcome::Retriable { reason: RetriableReason::Http5xx })
            }
        }
    }

    fn retry_config() -> RetryConfig {
        RetryConfig { max_attempts: 6, base_delay_ms: 1, max_delay_ms: 2, max_event_age_ms: 3_600_000 }
    }

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

    fn destination() -> Destination {
        Destination {
            destination_id: "dest_1".to_string(),
            tenant_id: "tenant_1".to_string(),
            name: "zap".to_string(),
            url: "https://example.invalid/hook".to_string(),
            method: DestinationMethod::Post,
            secret_ref: "dest_1.hmac".to_string(),
            active: true,
            rate_limit_rps: None,
            timeout_ms: 10_000,
            field_mapping: HashMap::new(),
            static_headers: HashMap::new(),
            auth: DestinationAuth::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let store = InMemorySubmissionStore::new();
        let secrets = InMemorySecretStore::new().with_secret("dest_1.hmac", b"s".to_vec());
        let bus = InMemoryEventBus::default();
        let connector = CountingConnector { calls: AtomicU32::new(0), succeed_on_attempt: 3 };

        let event = event();
        let destination = destination();

        deliver_with_retry(&store, &secrets, &connector, &bus, &retry_config(), &event, &destination)
            .await
            .unwrap();

        let attempts = store.list_delivery_attempts(event.submission_id).await.unwrap();
        assert_eq!(attempts.len(), 3);

        let last = attempts.iter().max_by_key(|a| a.attempt_number).unwrap();
        assert_eq!(last.state, DeliveryState::Succeeded);
        assert_eq!(connector.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_4xx_does_not_retry() {
        struct AlwaysTerminal;
        #[async_trait]
        impl Connector for AlwaysTerminal {
            async fn deliver(&self, _d: &Destination, _e: &CanonicalEvent, _s: Option<&[u8]>) -> Result<DeliveryOutcome> {
                Ok(DeliveryOutcome::Terminal { reason: TerminalReason::Http4xx })
            }
        }

        let store = InMemorySubmissionStore::new();
        let secrets = InMemorySecretStore::new().with_secret("dest_1.hmac", b"s".to_vec());
        let bus = InMemoryEventBus::default();
        let event = event();
        let destination = destination();

        deliver_with_retry(&store, &secrets, &AlwaysTerminal, &bus, &retry_config(), &event, &destination)
            .await
            .unwrap();

        let attempts = store.list_delivery_attempts(event.submission_id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].state, DeliveryState::Failed);
    }

    #[tokio::test]
    async fn test_exhausted_retries_publish_deliver_dlq() {
        struct AlwaysRetriable;
        #[async_trait]
        impl Connector for AlwaysRetriable {
            async fn deliver(&self, _d: &Destination, _e: &CanonicalEvent, _s: Option<&[u8]>) -> Result<DeliveryOutcome> {
                Ok(DeliveryOutcome::Retriable { reason: RetriableReason::Http5xx })
            }
        }

        let store = InMemorySubmissionStore::new();
        let secrets = InMemorySecretStore::new().with_secret("dest_1.hmac", b"s".to_vec());
        let bus = InMemoryEventBus::default();
        let mut dlq = bus.subscribe_deliver_dlq();
        let event = event();
        let destination = destination();
        let config = RetryConfig { max_attempts: 2, base_delay_ms: 1, max_delay_ms: 2, max_event_age_ms: 3_600_000 };

        deliver_with_retry(&store, &secrets, &AlwaysRetriable, &bus, &config, &event, &destination)
            .await
            .unwrap();

        let entry = dlq.recv().await.unwrap();
        assert_eq!(entry.submission_id, event.submission_id);
        assert_eq!(entry.destination_id, "dest_1");
    }

    #[tokio::test]
    async fn test_no_auth_mode_does_not_resolve_a_secret() {
        let secrets = InMemorySecretStore::new();
        let mut destination = destination();
        destination.auth = DestinationAuth { mode: crate::domain::DestinationAuthMode::None, secret_ref: None, header: None };

        let resolved = resolve_outbound_secret(&secrets, &destination).await.unwrap();
        assert!(resolved.is_none());
    }
}
