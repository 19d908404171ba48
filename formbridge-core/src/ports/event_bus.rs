//! EventBus port (spec §4.3, §4.5, §4.6, §4.9): publishes canonical events
//! for the persister and orchestrator to consume independently, plus the
//! dead-letter and closing topics each produces on exhaustion/completion.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::domain::{CanonicalEvent, SubmissionStatus};
use crate::error::Result;
use crate::ids::SubmissionId;

/// Subject a canonical event is published under (spec §4.2 step 5, §6.2).
pub const SUBMISSION_RECEIVED_SUBJECT: &str = "submission.received";

/// Subject the persister publishes to once its retry budget is exhausted
/// (spec §4.3, §4.6).
pub const PERSIST_DLQ_SUBJECT: &str = "persist.dlq";

/// Subject the orchestrator publishes to once a delivery's retry budget is
/// exhausted against one destination (spec §4.3, §4.9).
pub const DELIVER_DLQ_SUBJECT: &str = "deliver.dlq";

/// Subject the orchestrator publishes to once every destination for a
/// submission has reached a terminal outcome (spec §4.9 step 5).
pub const SUBMISSION_CLOSED_SUBJECT: &str = "submission.closed";

/// A `submission.received` event that the persister could not durably store
/// after exhausting its retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistDlqEntry {
    pub event: CanonicalEvent,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// One (submission, destination) delivery that exhausted the retry
/// controller's attempt budget without succeeding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverDlqEntry {
    pub submission_id: SubmissionId,
    pub destination_id: String,
    pub event: CanonicalEvent,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Summary emitted once a submission's fan-out has fully resolved (spec §4.9
/// step 5): every destination reached `Succeeded` or `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionClosed {
    pub submission_id: SubmissionId,
    pub tenant_id: String,
    pub status: SubmissionStatus,
    pub closed_at: DateTime<Utc>,
}

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes a `submission.received` event (spec §4.2 step 5, §6.2).
    async fn publish_submission_received(&self, event: &CanonicalEvent) -> Result<()>;

    /// Subscribes to `submission.received` events. Both the persister and
    /// the orchestrator call this independently (spec §4.3, §4.6, §4.9);
    /// each adapter owns its own consumer-group/ack semantics, but every
    /// subscriber must see every event.
    async fn subscribe_submission_received(&self) -> Result<BoxStream<'static, CanonicalEvent>>;

    /// Publishes to `persist.dlq` once the persister exhausts its retries
    /// for one event (spec §4.3, §4.6).
    async fn publish_persist_dlq(&self, entry: &PersistDlqEntry) -> Result<()>;

    /// Publishes to `deliver.dlq` once a delivery exhausts its retries
    /// against one destination (spec §4.3, §4.9).
    async fn publish_deliver_dlq(&self, entry: &DeliverDlqEntry) -> Result<()>;

    /// Publishes to `submission.closed` once every destination for a
    /// submission has reached a terminal state (spec §4.9 step 5).
    async fn publish_submission_closed(&self, event: &SubmissionClosed) -> Result<()>;

    /// Returns `true` if the bus is reachable and able to accept publishes.
    async fn is_ready(&self) -> bool;
}
