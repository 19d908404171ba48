//! Ingest handler (spec §4.2): authenticates, validates, rate-limits, and
//! publishes one form submission as a `submission.received` event.
//!
//! Persistence is not done here: [`crate::persister`] is an independent bus
//! subscriber that durably stores the event (spec §4.3, §4.6), so this
//! handler can accept and acknowledge a submission without waiting on a
//! store write.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::auth::{AuthHeaders, Authenticator};
use crate::config::{AuthConfig, IngestConfig};
use crate::domain::CanonicalEvent;
use crate::error::{Error, Result};
use crate::ids::SubmissionId;
use crate::ports::{EventBus, SecretStore, SubmissionStore};
use crate::rate_limit;

/// Request body accepted by `POST /ingest` (spec §4.2, §6.1).
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub form_id: String,
    /// Caller-supplied submission id, for idempotent retries. Generated if absent.
    #[serde(default)]
    pub submission_id: Option<SubmissionId>,
    /// Wire schema version the caller is submitting under (spec §4.2).
    pub schema_version: String,
    #[serde(default)]
    pub source: Option<String>,
    pub payload: serde_json::Value,
    /// Client-supplied submission timestamp. Defaults to the authenticated
    /// `X-Timestamp` when absent.
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    /// Destination ids to restrict fan-out to (spec §4.9 step 1). Absent or
    /// empty means every active destination.
    #[serde(default)]
    pub destinations: Option<Vec<String>>,
}

/// Result of a successful ingest: what the HTTP surface acknowledges back
/// to the caller before persistence or delivery has happened.
#[derive(Debug, Clone)]
pub struct IngestAccepted {
    pub submission_id: SubmissionId,
}

pub struct IngestHandler<'a> {
    auth_config: &'a AuthConfig,
    ingest_config: &'a IngestConfig,
    secrets: &'a dyn SecretStore,
    store: &'a dyn SubmissionStore,
    bus: &'a dyn EventBus,
}

impl<'a> IngestHandler<'a> {
    pub fn new(
        auth_config: &'a AuthConfig,
        ingest_config: &'a IngestConfig,
        secrets: &'a dyn SecretStore,
        store: &'a dyn SubmissionStore,
        bus: &'a dyn EventBus,
    ) -> Self {
        Self { auth_config, ingest_config, secrets, store, bus }
    }

    /// Processes one ingest request end to end (spec §4.2 steps 1-5).
    pub async fn handle(
        &self,
        headers: &AuthHeaders<'_>,
        raw_body: &[u8],
        client_ip: Option<String>,
    ) -> Result<IngestAccepted> {
        if raw_body.len() > self.ingest_config.max_payload_bytes {
            return Err(Error::IngestPayloadTooLarge);
        }

        let authenticator = Authenticator::new(self.auth_config, self.secrets, self.store);
        let tenant = authenticator.authenticate(headers, raw_body).await?;

        let request: IngestRequest =
            serde_json::from_slice(raw_body).map_err(|e| Error::IngestInvalidBody(e.to_string()))?;

        if request.form_id.trim().is_empty() {
            return Err(Error::ValidationError("form_id must not be empty".to_string()));
        }
        if request.schema_version.trim().is_empty() {
            return Err(Error::ValidationError("schema_version must not be empty".to_string()));
        }
        if !request.payload.is_object() {
            return Err(Error::ValidationError("payload must be a JSON object".to_string()));
        }

        let now = Utc::now();
        rate_limit::check_and_increment(self.store, &tenant.tenant_id, tenant.tier, self.ingest_config, now)
            .await?;

        let submission_id = request.submission_id.unwrap_or_default();
        let submitted_at = request.submitted_at.unwrap_or(now);

        let event = CanonicalEvent {
            submission_id,
            tenant_id: tenant.tenant_id.clone(),
            form_id: request.form_id,
            schema_version: request.schema_version,
            source: request.source,
            payload: request.payload,
            submitted_at,
            ingested_at: now,
            client_ip,
            requested_destinations: request.destinations.unwrap_or_default(),
        };

        self.bus.publish_submission_received(&event).await?;

        Ok(IngestAccepted { submission_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::sign_hex;
    use crate::domain::Tier;
    use crate::inmemory::{InMemoryEventBus, InMemorySecretStore, InMemorySubmissionStore};

    fn setup() -> (AuthConfig, IngestConfig, InMemorySecretStore, InMemorySubmissionStore, InMemoryEventBus) {
        let secrets = InMemorySecretStore::new().with_secret("tenant_1.hmac", b"shh".to_vec());
        let store = InMemorySubmissionStore::new();
        store.insert_tenant(crate::domain::Tenant {
            tenant_id: "tenant_1".to_string(),
            name: "Acme".to_string(),
            tier: Tier::Pro,
            active: true,
            created_at: Utc::now(),
        });
        let bus = InMemoryEventBus::default();
        (
            AuthConfig { replay_window_seconds: 300 },
            IngestConfig {
                max_payload_bytes: 4096,
                tier_limits: crate::config::TierLimits { free: 60, starter: 300, pro: 1000 },
            },
            secrets,
            store,
            bus,
        )
    }

    fn rfc3339_now() -> String {
        Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }

    #[tokio::test]
    async fn test_happy_path_publishes_canonical_event() {
        let (auth_config, ingest_config, secrets, store, bus) = setup();
        let mut stream = bus.subscribe_submission_received().await.unwrap();
        let handler = IngestHandler::new(&auth_config, &ingest_config, &secrets, &store, &bus);

        let body = br#"{"form_id":"contact","schema_version":"1.0","payload":{"email":"a@b.com"}}"#;
        let ts = rfc3339_now();
        let sig = sign_hex(b"shh", &ts, body);
        let headers = AuthHeaders { tenant_id: "tenant_1", timestamp: &ts, signature: &sig };

        let accepted = handler.handle(&headers, body, Some("203.0.113.5".to_string())).await.unwrap();

        let event = futures::StreamExt::next(&mut stream).await.unwrap();
        assert_eq!(event.submission_id, accepted.submission_id);
        assert_eq!(event.form_id, "contact");
        assert_eq!(event.schema_version, "1.0");
        assert_eq!(event.client_ip.as_deref(), Some("203.0.113.5"));
    }

    #[tokio::test]
    async fn test_missing_schema_version_rejected() {
        let (auth_config, ingest_config, secrets, store, bus) = setup();
        let handler = IngestHandler::new(&auth_config, &ingest_config, &secrets, &store, &bus);

        let body = br#"{"form_id":"contact","schema_version":"","payload":{}}"#;
        let ts = rfc3339_now();
        let sig = sign_hex(b"shh", &ts, body);
        let headers = AuthHeaders { tenant_id: "tenant_1", timestamp: &ts, signature: &sig };

        let err = handler.handle(&headers, body, None).await.unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_non_object_payload_rejected() {
        let (auth_config, ingest_config, secrets, store, bus) = setup();
        let handler = IngestHandler::new(&auth_config, &ingest_config, &secrets, &store, &bus);

        let body = br#"{"form_id":"contact","schema_version":"1.0","payload":"not an object"}"#;
        let ts = rfc3339_now();
        let sig = sign_hex(b"shh", &ts, body);
        let headers = AuthHeaders { tenant_id: "tenant_1", timestamp: &ts, signature: &sig };

        let err = handler.handle(&headers, body, None).await.unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_duplicate_submission_id_round_trips_unchanged() {
        let (auth_config, ingest_config, secrets, store, bus) = setup();
        let handler = IngestHandler::new(&auth_config, &ingest_config, &secrets, &store, &bus);

        let id = SubmissionId::new();
        let body = format!(r#"{{"form_id":"contact","schema_version":"1.0","submission_id":"{id}","payload":{{}}}}"#);
        let ts = rfc3339_now();
        let sig = sign_hex(b"shh", &ts, body.as_bytes());
        let headers = AuthHeaders { tenant_id: "tenant_1", timestamp: &ts, signature: &sig };

        let first = handler.handle(&headers, body.as_bytes(), None).await.unwrap();
        let second = handler.handle(&headers, body.as_bytes(), None).await.unwrap();
        assert_eq!(first.submission_id, second.submission_id);
        assert_eq!(first.submission_id, id);
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected() {
        let (auth_config, mut ingest_config, secrets, store, bus) = setup();
        ingest_config.max_payload_bytes = 8;
        let handler = IngestHandler::new(&auth_config, &ingest_config, &secrets, &store, &bus);

        let body = br#"{"form_id":"contact"}"#;
        let headers = AuthHeaders { tenant_id: "tenant_1", timestamp: "0", signature: "x" };
        let err = handler.handle(&headers, body, None).await.unwrap_err();
        assert!(matches!(err, Error::IngestPayloadTooLarge));
    }
}
