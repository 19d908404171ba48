//! SubmissionStore port (spec §4.3, §4.6, §4.10, §4.12): the single source
//! of truth for tenants, destinations, submissions, delivery attempts, and
//! rate-limit counters.
//!
//! One trait covers all five record kinds rather than five traits, mirroring
//! the spec's single-table data model: a production adapter backs all of
//! them with one store (e.g. one DynamoDB table keyed by PK/SK), and an
//! in-memory reference adapter can share one lock across all of them too.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{DeliveryAttempt, DeliveryState, Destination, RateBucket, Submission, Tenant};
use crate::error::Result;
use crate::ids::SubmissionId;

/// An opaque, forward-only pagination cursor (spec §4.12).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(pub String);

/// A page of results plus the cursor to fetch the next page, if any.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<Cursor>,
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Looks up a tenant by id. Returns `Ok(None)` for an unknown tenant
    /// (distinct from a store failure, which is `Err`).
    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>>;

    /// Lists the active destinations configured for a tenant (spec §4.9 fan-out).
    async fn list_active_destinations(&self, tenant_id: &str) -> Result<Vec<Destination>>;

    /// Looks up a single destination, active or not (orchestrator needs this
    /// to detect mid-flight deletion, spec §4.9).
    async fn get_destination(&self, tenant_id: &str, destination_id: &str) -> Result<Option<Destination>>;

    /// Persists a new submission. Idempotent on `submission_id`: a second
    /// call with the same id returns the originally stored record rather
    /// than creating a duplicate (spec §4.6, §8 scenario 2).
    async fn create_submission(&self, submission: Submission) -> Result<Submission>;

    /// Fetches a previously stored submission.
    async fn get_submission(&self, tenant_id: &str, submission_id: SubmissionId) -> Result<Option<Submission>>;

    /// Lists a tenant's submissions, newest first, cursor-paginated and
    /// optionally restricted to a `[since, until)` window over
    /// `submitted_at` (spec §4.12 `listSubmissionsByTime`).
    async fn list_submissions(
        &self,
        tenant_id: &str,
        limit: u32,
        cursor: Option<Cursor>,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Page<Submission>>;

    /// Appends one delivery attempt row. `attempt_number` is the row's
    /// identity alongside `(submission_id, destination_id)`: this must never
    /// overwrite a previously recorded attempt (spec §3.2, §3.1 storage key
    /// `SK=DEST#{d}#ATTEMPT#{n:04d}`) — the audit trail is append-only.
    async fn put_delivery_attempt(&self, attempt: DeliveryAttempt) -> Result<()>;

    /// Fetches the most recent (highest `attempt_number`) attempt record for
    /// a (submission, destination) pair.
    async fn get_delivery_attempt(
        &self,
        submission_id: SubmissionId,
        destination_id: &str,
    ) -> Result<Option<DeliveryAttempt>>;

    /// Lists every delivery attempt recorded for a submission, used to derive
    /// [`crate::domain::SubmissionStatus`] (spec §4.6).
    async fn list_delivery_attempts(&self, submission_id: SubmissionId) -> Result<Vec<DeliveryAttempt>>;

    /// Atomically increments the fixed-window rate counter for `tenant_id`
    /// and returns the bucket's state *after* the increment (spec §4.10).
    /// `window_start` identifies the current window; a new window begins a
    /// fresh counter at 0.
    async fn increment_rate_bucket(
        &self,
        tenant_id: &str,
        window_start: DateTime<Utc>,
        limit: u32,
    ) -> Result<RateBucket>;

    /// Returns `true` if the store is reachable and able to serve reads/writes.
    async fn is_ready(&self) -> bool;
}

/// Convenience used by the orchestrator to summarize a submission's status
/// from its recorded attempts (spec §4.6).
pub fn derive_submission_status(attempts: &[DeliveryAttempt]) -> crate::domain::SubmissionStatus {
    use crate::domain::SubmissionStatus as S;

    if attempts.is_empty() {
        return S::Received;
    }

    let total = attempts.len();
    let succeeded = attempts.iter().filter(|a| a.state == DeliveryState::Succeeded).count();
    let failed = attempts.iter().filter(|a| a.state == DeliveryState::Failed).count();
    let in_flight = total - succeeded - failed;

    if succeeded == total {
        S::Delivered
    } else if failed == total {
        S::Failed
    } else if in_flight > 0 {
        S::Delivering
    } else {
        S::PartiallyDelivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DeliveryState;
    use chrono::Utc;

    fn attempt(state: DeliveryState) -> DeliveryAttempt {
        DeliveryAttempt {
            submission_id: SubmissionId::new(),
            destination_id: "dest_1".to_string(),
            attempt_number: 1,
            state,
            last_error_kind: None,
            last_attempted_at: None,
            next_attempt_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_derive_status_all_succeeded() {
        let attempts = vec![attempt(DeliveryState::Succeeded), attempt(DeliveryState::Succeeded)];
        assert_eq!(derive_submission_status(&attempts), crate::domain::SubmissionStatus::Delivered);
    }

    #[test]
    fn test_derive_status_mixed() {
        let attempts = vec![attempt(DeliveryState::Succeeded), attempt(DeliveryState::Failed)];
        assert_eq!(
            derive_submission_status(&attempts),
            crate::domain::SubmissionStatus::PartiallyDelivered
        );
    }

    #[test]
    fn test_derive_status_empty() {
        assert_eq!(derive_submission_status(&[]), crate::domain::SubmissionStatus::Received);
    }
}
