//! # formbridge-core
//!
//! Multi-tenant form-submission ingestion and fan-out: HMAC request
//! authentication, idempotent submission persistence, event-bus publish, and
//! a bounded-concurrency delivery orchestrator with retry/backoff.
//!
//! The crate is organized as hexagonal ports and adapters:
//! - [`ports`] defines `SecretStore`, `SubmissionStore`, `EventBus` as traits.
//! - [`inmemory`] provides fully functional reference adapters for all three,
//!   used by default and in tests.
//! - [`cache`]/[`events`] provide optional production adapters (Redis-backed
//!   secret cache, NATS-backed event bus) behind the `redis-cache`/`nats`
//!   feature flags.
//! - [`auth`], [`ingest`], [`persister`], [`connectors`], [`orchestrator`],
//!   [`retry`], [`rate_limit`], [`query`] implement the domain logic against
//!   those ports.
//!
//! ## Example
//!
//! ```rust,no_run
//! use formbridge_core::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let secrets: Arc<dyn SecretStore> = Arc::new(InMemorySecretStore::new());
//!     let store: Arc<dyn SubmissionStore> = Arc::new(InMemorySubmissionStore::new());
//!     let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::default());
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod connectors;
pub mod domain;
pub mod error;
pub mod events;
pub mod ids;
pub mod inmemory;
pub mod ingest;
pub mod metrics;
pub mod observability;
pub mod orchestrator;
pub mod persister;
pub mod ports;
pub mod query;
pub mod rate_limit;
pub mod responses;
pub mod retry;

/// Convenient re-exports of the crate's core types.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::ids::{MakeTypedRequestId, RequestId, RequestIdError, SubmissionId};
    pub use crate::observability::init_tracing;
    pub use crate::responses::{Accepted, Conflict, Created, FieldError, NoContent, Success, ValidationError};

    pub use crate::domain::{
        CanonicalEvent, DeliveryAttempt, DeliveryOutcome, DeliveryState, Destination, RateBucket,
        RetriableReason, Submission, SubmissionStatus, Tenant, TerminalReason, Tier,
    };

    pub use crate::ports::{EventBus, SecretStore, SubmissionStore};
    pub use crate::inmemory::{InMemoryEventBus, InMemorySecretStore, InMemorySubmissionStore};

    #[cfg(feature = "nats")]
    pub use crate::events::NatsEventBus;

    #[cfg(feature = "redis-cache")]
    pub use crate::cache::RedisSecretStore;

    pub use crate::auth::{AuthHeaders, Authenticator};
    pub use crate::connectors::{Connector, RestConnector};
    pub use crate::ingest::{IngestHandler, IngestRequest};
    pub use crate::metrics::{CountingMetricsSink, MetricsSink, NoopMetricsSink};
    pub use crate::orchestrator::Orchestrator;
    pub use crate::persister::Persister;

    pub use async_trait::async_trait;
    pub use tracing::{debug, error, info, instrument, trace, warn};
}
