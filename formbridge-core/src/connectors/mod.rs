//! Connectors: deliver one canonical event to one destination and classify
//! the result for the orchestrator/retry controller (spec §4.7, §4.8).

pub mod rest;

pub use rest::RestConnector;

use async_trait::async_trait;

use crate::domain::{CanonicalEvent, DeliveryOutcome, Destination};
use crate::error::Result;

/// Delivers a canonical event to a destination.
///
/// `secret` is `None` when `destination.auth.mode` is [`crate::domain::DestinationAuthMode::None`]
/// — no signing or credential material is needed to deliver.
///
/// Implementations must never return `Err` for a destination-side failure —
/// those are reported as [`DeliveryOutcome::Retriable`]/[`DeliveryOutcome::Terminal`]
/// so the orchestrator can classify and schedule retries. `Err` is reserved
/// for failures in the connector's own setup (e.g. malformed secret).
#[async_trait]
pub trait Connector: Send + Sync {
    async fn deliver(
        &self,
        destination: &Destination,
        event: &CanonicalEvent,
        secret: Option<&[u8]>,
    ) -> Result<DeliveryOutcome>;
}
