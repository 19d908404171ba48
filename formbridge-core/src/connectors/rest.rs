//! Generic REST connector (spec §4.7, §4.8): sends the canonical event (or a
//! `field_mapping`-projected subset of it) to a destination's URL with the
//! configured method, static headers, and outbound auth scheme.

use async_trait::async_trait;
use std::time::Duration;

use crate::auth::sign_hex;
use crate::connectors::Connector;
use crate::domain::{
    CanonicalEvent, DeliveryOutcome, Destination, DestinationAuthMode, DestinationMethod, RetriableReason,
    TerminalReason,
};
use crate::error::{Error, Result};

pub struct RestConnector {
    client: reqwest::Client,
}

impl RestConnector {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is static and valid");
        Self { client }
    }
}

/// Resolves a single dot-path segment chain (`"contact.email"`) against the
/// event's JSON representation. No wildcards, no filters — this is not
/// JMESPath, just enough to let a destination rename/flatten fields.
fn resolve_path<'a>(root: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.').try_fold(root, |value, segment| value.get(segment))
}

/// Builds the outbound body per `destination.field_mapping` (spec §4.8): an
/// empty mapping sends the full event; a non-empty one projects named fields
/// into a flat object, dropping any path that doesn't resolve.
fn build_body(destination: &Destination, event: &CanonicalEvent) -> Vec<u8> {
    if destination.field_mapping.is_empty() {
        return serde_json::to_vec(event).expect("CanonicalEvent always serializes");
    }

    let root = serde_json::to_value(event).expect("CanonicalEvent always serializes");
    let mut mapped = serde_json::Map::new();
    for (target_field, source_path) in &destination.field_mapping {
        if let Some(value) = resolve_path(&root, source_path) {
            mapped.insert(target_field.clone(), value.clone());
        }
    }
    serde_json::to_vec(&serde_json::Value::Object(mapped)).expect("mapped object always serializes")
}

#[async_trait]
impl Connector for RestConnector {
    async fn deliver(
        &self,
        destination: &Destination,
        event: &CanonicalEvent,
        secret: Option<&[u8]>,
    ) -> Result<DeliveryOutcome> {
        let body = build_body(destination, event);
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

        let method = match destination.method {
            DestinationMethod::Post => reqwest::Method::POST,
            DestinationMethod::Put => reqwest::Method::PUT,
            DestinationMethod::Patch => reqwest::Method::PATCH,
        };

        let mut request = self
            .client
            .request(method, &destination.url)
            .timeout(Duration::from_millis(destination.timeout_ms))
            .header("Content-Type", "application/json")
            .header("X-Form-Bridge-Submission-Id", event.submission_id.to_string());

        for (name, value) in &destination.static_headers {
            request = request.header(name, value);
        }

        request = match destination.auth.mode {
            DestinationAuthMode::None => request,
            DestinationAuthMode::ApiKeyHeader => {
                let secret = secret.ok_or_else(|| Error::Internal("missing secret for api_key_header auth".to_string()))?;
                let header = destination.auth.header.as_deref().unwrap_or("X-Api-Key");
                request.header(header, secret)
            }
            DestinationAuthMode::Bearer => {
                let secret = secret.ok_or_else(|| Error::Internal("missing secret for bearer auth".to_string()))?;
                request.header("Authorization", format!("Bearer {}", String::from_utf8_lossy(secret)))
            }
            DestinationAuthMode::HmacOutbound => {
                let secret = secret.ok_or_else(|| Error::Internal("missing secret for hmac_outbound auth".to_string()))?;
                let signature = sign_hex(secret, &timestamp, &body);
                request.header("X-Timestamp", &timestamp).header("X-Signature", signature)
            }
        };

        let response = request.body(body).send().await;

        let response = match response {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => return Ok(DeliveryOutcome::Retriable { reason: RetriableReason::Timeout }),
            Err(_) => return Ok(DeliveryOutcome::Retriable { reason: RetriableReason::Network }),
        };

        let status = response.status();

        if status.is_success() {
            Ok(DeliveryOutcome::Success { status: status.as_u16() })
        } else if status.as_u16() == 429 {
            Ok(DeliveryOutcome::Retriable { reason: RetriableReason::RateLimited })
        } else if status.as_u16() == 408 || status.as_u16() == 425 {
            Ok(DeliveryOutcome::Retriable { reason: RetriableReason::RequestTimeout })
        } else if status.is_server_error() {
            Ok(DeliveryOutcome::Retriable { reason: RetriableReason::Http5xx })
        } else {
            Ok(DeliveryOutcome::Terminal { reason: TerminalReason::Http4xx })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DestinationAuth, SubmissionId};
    use chrono::Utc;
    use std::collections::HashMap;

    #[test]
    fn test_connector_constructs_with_timeout() {
        let _connector = RestConnector::new(Duration::from_secs(5));
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

    fn event() -> CanonicalEvent {
        CanonicalEvent {
            submission_id: SubmissionId::new(),
            tenant_id: "tenant_1".to_string(),
            form_id: "contact".to_string(),
            schema_version: "1.0".to_string(),
            source: None,
            payload: serde_json::json!({"contact": {"email": "a@b.com"}}),
            submitted_at: Utc::now(),
            ingested_at: Utc::now(),
            client_ip: None,
            requested_destinations: Vec::new(),
        }
    }

    #[test]
    fn test_build_body_sends_full_event_when_mapping_empty() {
        let body = build_body(&destination(), &event());
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["form_id"], "contact");
    }

    #[test]
    fn test_build_body_projects_mapped_fields() {
        let mut dest = destination();
        dest.field_mapping.insert("email".to_string(), "payload.contact.email".to_string());
        let body = build_body(&dest, &event());
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["email"], "a@b.com");
        assert!(parsed.get("form_id").is_none());
    }

    #[test]
    fn test_build_body_drops_unresolvable_paths() {
        let mut dest = destination();
        dest.field_mapping.insert("missing".to_string(), "payload.nope".to_string());
        let body = build_body(&dest, &event());
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(parsed.get("missing").is_none());
    }
}
