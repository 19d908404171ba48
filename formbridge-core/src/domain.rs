//! Domain model: the entities and value types every component operates on.
//!
//! These types mirror the data model's key layouts (PK/SK/GSI1) only in
//! spirit — the storage encoding is the [`crate::ports::submission_store`]
//! adapter's concern, not this module's. This module defines the shapes
//! components pass to one another in memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ids::SubmissionId;

/// Subscription tier, governing the default ingest rate limit (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Starter,
    Pro,
}

/// A tenant account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub tenant_id: String,
    pub name: String,
    pub tier: Tier,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// HTTP method a REST connector invokes a destination with (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DestinationMethod {
    Post,
    Put,
    Patch,
}

impl Default for DestinationMethod {
    fn default() -> Self {
        Self::Post
    }
}

/// How a REST connector authenticates itself to a destination (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationAuthMode {
    None,
    ApiKeyHeader,
    Bearer,
    HmacOutbound,
}

impl Default for DestinationAuthMode {
    fn default() -> Self {
        Self::None
    }
}

/// Outbound auth configuration for one destination (spec §4.8).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DestinationAuth {
    pub mode: DestinationAuthMode,
    /// Secret reference resolved via [`crate::ports::secret_store::SecretStore`].
    /// Falls back to the destination's own `secret_ref` when absent.
    #[serde(default)]
    pub secret_ref: Option<String>,
    /// Header name for `api_key_header` mode. Defaults to `X-Api-Key`.
    #[serde(default)]
    pub header: Option<String>,
}

/// A configured fan-out target belonging to a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub destination_id: String,
    pub tenant_id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub method: DestinationMethod,
    /// Secret reference resolved via [`crate::ports::secret_store::SecretStore`],
    /// never the secret material itself. Used for `hmac_outbound` signing
    /// unless `auth.secret_ref` overrides it.
    pub secret_ref: String,
    pub active: bool,
    /// Requests-per-second override; `None` falls back to
    /// [`crate::config::OrchestratorConfig::default_destination_rps`].
    pub rate_limit_rps: Option<u32>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Target field -> dot-path expression into the canonical event's JSON
    /// representation (spec §4.8). Empty means "send the full event".
    #[serde(default)]
    pub field_mapping: HashMap<String, String>,
    #[serde(default)]
    pub static_headers: HashMap<String, String>,
    #[serde(default)]
    pub auth: DestinationAuth,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// A stored form submission (spec §3, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub submission_id: SubmissionId,
    pub tenant_id: String,
    pub form_id: String,
    pub schema_version: String,
    #[serde(default)]
    pub source: Option<String>,
    pub payload: serde_json::Value,
    /// Client-supplied submission time (`X-Timestamp`). Immutable once
    /// stored — never overwritten by a later retry of the same submission.
    pub submitted_at: DateTime<Utc>,
    /// Server-assigned receipt time, always >= `submitted_at`.
    pub ingested_at: DateTime<Utc>,
    #[serde(default)]
    pub client_ip: Option<String>,
    /// Destination ids the caller restricted fan-out to, if any (spec §4.9
    /// step 1). Empty means "all active destinations".
    #[serde(default)]
    pub requested_destinations: Vec<String>,
    pub status: SubmissionStatus,
}

/// Overall submission lifecycle status, derived from its delivery attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Received,
    Delivering,
    Delivered,
    PartiallyDelivered,
    Failed,
}

/// The canonical event published to the bus on successful ingest (spec §4.2, §6.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub submission_id: SubmissionId,
    pub tenant_id: String,
    pub form_id: String,
    pub schema_version: String,
    #[serde(default)]
    pub source: Option<String>,
    pub payload: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    #[serde(default)]
    pub client_ip: Option<String>,
    #[serde(default)]
    pub requested_destinations: Vec<String>,
}

impl CanonicalEvent {
    pub fn from_submission(submission: &Submission) -> Self {
        Self {
            submission_id: submission.submission_id,
            tenant_id: submission.tenant_id.clone(),
            form_id: submission.form_id.clone(),
            schema_version: submission.schema_version.clone(),
            source: submission.source.clone(),
            payload: submission.payload.clone(),
            submitted_at: submission.submitted_at,
            ingested_at: submission.ingested_at,
            client_ip: submission.client_ip.clone(),
            requested_destinations: submission.requested_destinations.clone(),
        }
    }
}

/// One delivery attempt against one destination (spec §4.9, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub submission_id: SubmissionId,
    pub destination_id: String,
    pub attempt_number: u32,
    pub state: DeliveryState,
    pub last_error_kind: Option<String>,
    pub last_attempted_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// State machine position for one delivery attempt (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    Pending,
    RateChecking,
    Invoking,
    Classifying,
    Succeeded,
    SchedulingRetry,
    Failed,
}

/// Outcome of one connector invocation, before classification (spec §4.7).
#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
    Success { status: u16 },
    Retriable { reason: RetriableReason },
    Terminal { reason: TerminalReason },
}

/// Why a connector invocation should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetriableReason {
    Network,
    Timeout,
    /// HTTP 408 (Request Timeout) or 425 (Too Early): the destination asked
    /// to be retried, distinct from a hard transport-level timeout.
    RequestTimeout,
    Http5xx,
    RateLimited,
}

/// Why a connector invocation is terminally failed, not retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    Http4xx,
    EventAgeExceeded,
    DestinationDeleted,
}

/// A fixed-window rate-limit counter bucket (spec §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateBucket {
    pub tenant_id: String,
    pub window_start: DateTime<Utc>,
    pub count: u32,
    pub limit: u32,
}

impl RateBucket {
    /// `true` once `count` has gone past `limit`. A count equal to the limit
    /// is still allowed — the request that brought the bucket to exactly
    /// `limit` is the last one admitted this window (spec §4.10, §8 property 7).
    pub fn is_exceeded(&self) -> bool {
        self.count > self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(count: u32, limit: u32) -> RateBucket {
        RateBucket { tenant_id: "tenant_1".to_string(), window_start: Utc::now(), count, limit }
    }

    #[test]
    fn test_rate_bucket_not_exceeded_at_limit() {
        assert!(!bucket(2, 2).is_exceeded());
    }

    #[test]
    fn test_rate_bucket_exceeded_past_limit() {
        assert!(bucket(3, 2).is_exceeded());
    }
}
