//! Error types and HTTP response conversion
//!
//! Every error kind named in this module corresponds to one of the
//! machine-readable codes listed under each component's error table. The
//! HTTP surface never leaks internal detail: [`IntoResponse`] collapses each
//! variant into an opaque [`ErrorResponse`] envelope carrying only a stable
//! `code`, a status, and a message safe to show a tenant operator.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Redis error (SecretStore cache backing, `redis-cache` feature).
    #[cfg(feature = "redis-cache")]
    #[error("redis error: {0}")]
    Redis(Box<redis::RedisError>),

    /// NATS error (EventBus backing, `nats` feature).
    #[cfg(feature = "nats")]
    #[error("nats error: {0}")]
    Nats(String),

    // -- auth.* (spec §4.1, §7) --
    /// Request carried no `X-Tenant-Id`/`X-Timestamp`/`X-Signature` header.
    #[error("missing authentication header: {0}")]
    AuthMissingHeader(String),

    /// `X-Timestamp` fell outside the configured replay window.
    #[error("stale timestamp")]
    AuthStaleTimestamp,

    /// `X-Tenant-Id` does not resolve to a known, active tenant.
    #[error("unknown tenant")]
    AuthUnknownTenant,

    /// HMAC signature did not match.
    #[error("bad signature")]
    AuthBadSignature,

    /// Query's `tenant_id` parameter does not match the authenticated tenant.
    #[error("tenant mismatch")]
    AuthTenantMismatch,

    // -- ingest.* (spec §4.2, §7) --
    /// Body was not valid per the ingest content contract (not JSON, wrong shape).
    #[error("invalid request body: {0}")]
    IngestInvalidBody(String),

    /// Body exceeded `ingest.max_payload_bytes`.
    #[error("payload too large")]
    IngestPayloadTooLarge,

    /// Tenant exceeded its configured ingest rate.
    #[error("rate limited")]
    IngestRateLimited,

    // -- bus.* (spec §4.9, §7) --
    /// EventBus publish failed after the adapter's own retries.
    #[error("event bus publish failed: {0}")]
    BusPublishFailed(String),

    // -- store.* (spec §4.6, §7) --
    /// Write collided with an existing record (e.g. duplicate submission id).
    #[error("store conflict: {0}")]
    StoreConflict(String),

    /// Store backend unreachable or returned a transient failure.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    // -- connector.* (spec §4.7, §4.8, §7) --
    /// Low-level transport failure reaching the destination.
    #[error("connector network error: {0}")]
    ConnectorNetwork(String),

    /// Destination did not respond within the configured timeout.
    #[error("connector timeout")]
    ConnectorTimeout,

    /// Destination responded with a 5xx status.
    #[error("connector returned server error: {0}")]
    ConnectorHttp5xx(u16),

    /// Destination responded with 429.
    #[error("connector rate limited")]
    ConnectorRateLimited,

    /// Destination responded with a non-429 4xx status (terminal, not retried).
    #[error("connector returned client error: {0}")]
    ConnectorHttp4xx(u16),

    // -- orchestrator.* (spec §4.9, §7) --
    /// Event exceeded `retry.max_event_age_ms` before a terminal outcome.
    #[error("event age exceeded maximum")]
    OrchestratorEventAgeExceeded,

    /// Destination was deleted mid-flight; delivery abandoned, not failed.
    #[error("destination deleted")]
    OrchestratorDestinationDeleted,

    /// Malformed cursor supplied to the query API.
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    /// Request validation failure not covered by a more specific variant.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Catch-all for unexpected internal failures.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body returned to HTTP clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message, safe to display.
    pub error: String,

    /// Stable machine-readable error code, e.g. `auth.bad_signature`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// HTTP status code.
    pub status: u16,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
            status: status.as_u16(),
        }
    }

    pub fn with_code(status: StatusCode, code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: Some(code.into()),
            status: status.as_u16(),
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error {
    /// The stable, machine-readable code for this error (spec §7 tables).
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "config.invalid",
            #[cfg(feature = "redis-cache")]
            Error::Redis(_) => "cache.unavailable",
            #[cfg(feature = "nats")]
            Error::Nats(_) => "bus.publish_failed",
            Error::AuthMissingHeader(_) => "auth.missing_header",
            Error::AuthStaleTimestamp => "auth.stale_timestamp",
            Error::AuthUnknownTenant => "auth.unknown_tenant",
            Error::AuthBadSignature => "auth.bad_signature",
            Error::AuthTenantMismatch => "auth.tenant_mismatch",
            Error::IngestInvalidBody(_) => "ingest.invalid_body",
            Error::IngestPayloadTooLarge => "ingest.payload_too_large",
            Error::IngestRateLimited => "ingest.rate_limited",
            Error::BusPublishFailed(_) => "bus.publish_failed",
            Error::StoreConflict(_) => "store.conflict",
            Error::StoreUnavailable(_) => "store.unavailable",
            Error::NotFound(_) => "store.not_found",
            Error::ConnectorNetwork(_) => "connector.network",
            Error::ConnectorTimeout => "connector.timeout",
            Error::ConnectorHttp5xx(_) => "connector.http_5xx",
            Error::ConnectorRateLimited => "connector.rate_limited",
            Error::ConnectorHttp4xx(_) => "connector.http_4xx",
            Error::OrchestratorEventAgeExceeded => "orchestrator.event_age_exceeded",
            Error::OrchestratorDestinationDeleted => "orchestrator.destination_deleted",
            Error::InvalidCursor(_) => "query.invalid_cursor",
            Error::ValidationError(_) => "validation_error",
            Error::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::Config(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            #[cfg(feature = "redis-cache")]
            Error::Redis(_) => StatusCode::INTERNAL_SERVER_ERROR,
            #[cfg(feature = "nats")]
            Error::Nats(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::AuthMissingHeader(_) | Error::AuthStaleTimestamp | Error::AuthBadSignature => {
                StatusCode::UNAUTHORIZED
            }
            Error::AuthUnknownTenant => StatusCode::UNAUTHORIZED,
            Error::AuthTenantMismatch => StatusCode::FORBIDDEN,
            Error::IngestInvalidBody(_) | Error::ValidationError(_) | Error::InvalidCursor(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::IngestPayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Error::IngestRateLimited => StatusCode::TOO_MANY_REQUESTS,
            Error::BusPublishFailed(_) | Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::StoreConflict(_) => StatusCode::CONFLICT,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::ConnectorNetwork(_)
            | Error::ConnectorTimeout
            | Error::ConnectorHttp5xx(_)
            | Error::ConnectorRateLimited
            | Error::ConnectorHttp4xx(_) => StatusCode::BAD_GATEWAY,
            Error::OrchestratorEventAgeExceeded | Error::OrchestratorDestinationDeleted => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
        }
    }

    /// The message shown to callers. Kept `pub(crate)` (rather than fully
    /// private) so tests can assert two error variants render identically.
    pub(crate) fn user_message(&self) -> String {
        match self {
            Error::Config(e) => e.to_string(),
            #[cfg(feature = "redis-cache")]
            Error::Redis(_) => "cache backend unavailable".to_string(),
            #[cfg(feature = "nats")]
            Error::Nats(_) => "event bus unavailable".to_string(),
            // All four auth failure kinds render identically: spec §4.1 requires
            // that a caller cannot distinguish "no such tenant" from "bad
            // signature" (or a missing header, or a stale clock) from the
            // response body alone. `code()` still differs per variant for
            // structured, server-side-only logs.
            Error::AuthMissingHeader(_)
            | Error::AuthStaleTimestamp
            | Error::AuthUnknownTenant
            | Error::AuthBadSignature => "authentication failed".to_string(),
            Error::AuthTenantMismatch => "tenant_id does not match authenticated tenant".to_string(),
            Error::IngestInvalidBody(msg) => msg.clone(),
            Error::IngestPayloadTooLarge => "payload exceeds maximum allowed size".to_string(),
            Error::IngestRateLimited => "rate limit exceeded".to_string(),
            Error::BusPublishFailed(_) => "event bus is temporarily unavailable".to_string(),
            Error::StoreConflict(msg) => msg.clone(),
            Error::StoreUnavailable(_) => "storage backend is temporarily unavailable".to_string(),
            Error::NotFound(msg) => msg.clone(),
            Error::ConnectorNetwork(_) => "destination unreachable".to_string(),
            Error::ConnectorTimeout => "destination did not respond in time".to_string(),
            Error::ConnectorHttp5xx(code) => format!("destination returned {code}"),
            Error::ConnectorRateLimited => "destination rate limited the request".to_string(),
            Error::ConnectorHttp4xx(code) => format!("destination rejected request with {code}"),
            Error::OrchestratorEventAgeExceeded => "delivery exceeded maximum retry age".to_string(),
            Error::OrchestratorDestinationDeleted => "destination no longer exists".to_string(),
            Error::InvalidCursor(msg) => msg.clone(),
            Error::ValidationError(msg) => msg.clone(),
            Error::Internal(_) => "internal server error".to_string(),
        }
    }

    /// Whether this error class represents a condition the orchestrator
    /// should retry (spec §4.9 classification table).
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::ConnectorNetwork(_)
                | Error::ConnectorTimeout
                | Error::ConnectorHttp5xx(_)
                | Error::ConnectorRateLimited
                | Error::StoreUnavailable(_)
                | Error::BusPublishFailed(_)
        )
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "{self}");
        } else {
            tracing::warn!(code = self.code(), "{self}");
        }
        let body = ErrorResponse::with_code(status, self.code(), self.user_message());
        (status, Json(body)).into_response()
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

#[cfg(feature = "redis-cache")]
impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Redis(Box::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::IngestInvalidBody(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::ConnectorTimeout
        } else if let Some(status) = err.status() {
            if status.as_u16() == 429 {
                Error::ConnectorRateLimited
            } else if status.is_server_error() {
                Error::ConnectorHttp5xx(status.as_u16())
            } else {
                Error::ConnectorHttp4xx(status.as_u16())
            }
        } else {
            Error::ConnectorNetwork(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_match_spec_naming() {
        assert_eq!(Error::AuthBadSignature.code(), "auth.bad_signature");
        assert_eq!(Error::IngestRateLimited.code(), "ingest.rate_limited");
        assert_eq!(
            Error::OrchestratorEventAgeExceeded.code(),
            "orchestrator.event_age_exceeded"
        );
    }

    #[test]
    fn test_retriable_classification() {
        assert!(Error::ConnectorTimeout.is_retriable());
        assert!(Error::ConnectorHttp5xx(503).is_retriable());
        assert!(!Error::ConnectorHttp4xx(400).is_retriable());
        assert!(!Error::AuthBadSignature.is_retriable());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::IngestRateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(Error::StoreConflict("dup".into()).status(), StatusCode::CONFLICT);
        assert_eq!(Error::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
    }
}
