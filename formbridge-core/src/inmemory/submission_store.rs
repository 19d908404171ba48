use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::{DeliveryAttempt, Destination, RateBucket, Submission, Tenant};
use crate::error::{Error, Result};
use crate::ids::SubmissionId;
use crate::ports::submission_store::{Cursor, Page};
use crate::ports::SubmissionStore;

#[derive(Default)]
struct Inner {
    tenants: HashMap<String, Tenant>,
    destinations: HashMap<String, Vec<Destination>>,
    submissions: HashMap<String, Vec<Submission>>,
    /// Keyed by `(submission_id, destination_id, attempt_number)` so a new
    /// attempt never overwrites a prior one (spec §3.2 append-only audit trail).
    delivery_attempts: HashMap<(SubmissionId, String, u32), DeliveryAttempt>,
    rate_buckets: HashMap<(String, DateTime<Utc>), u32>,
}

/// A `Mutex`-guarded in-process store backing all five record kinds.
pub struct InMemorySubmissionStore {
    inner: Mutex<Inner>,
}

impl InMemorySubmissionStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn insert_tenant(&self, tenant: Tenant) {
        self.inner
            .lock()
            .expect("store lock poisoned")
            .tenants
            .insert(tenant.tenant_id.clone(), tenant);
    }

    pub fn insert_destination(&self, destination: Destination) {
        self.inner
            .lock()
            .expect("store lock poisoned")
            .destinations
            .entry(destination.tenant_id.clone())
            .or_default()
            .push(destination);
    }
}

impl Default for InMemorySubmissionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_cursor(submission_id: SubmissionId) -> Cursor {
    Cursor(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(submission_id.to_string()))
}

fn decode_cursor(cursor: &Cursor) -> Result<SubmissionId> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(&cursor.0)
        .map_err(|e| Error::InvalidCursor(e.to_string()))?;
    let s = String::from_utf8(bytes).map_err(|e| Error::InvalidCursor(e.to_string()))?;
    s.parse().map_err(|e: uuid::Error| Error::InvalidCursor(e.to_string()))
}

#[async_trait]
impl SubmissionStore for InMemorySubmissionStore {
    async fn get_tenant(&self, tenant_id: &str) -> Result<Option<Tenant>> {
        Ok(self.inner.lock().expect("store lock poisoned").tenants.get(tenant_id).cloned())
    }

    async fn list_active_destinations(&self, tenant_id: &str) -> Result<Vec<Destination>> {
        Ok(self
            .inner
            .lock()
            .expect("store lock poisoned")
            .destinations
            .get(tenant_id)
            .map(|dests| dests.iter().filter(|d| d.active).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_destination(&self, tenant_id: &str, destination_id: &str) -> Result<Option<Destination>> {
        Ok(self
            .inner
            .lock()
            .expect("store lock poisoned")
            .destinations
            .get(tenant_id)
            .and_then(|dests| dests.iter().find(|d| d.destination_id == destination_id).cloned()))
    }

    async fn create_submission(&self, submission: Submission) -> Result<Submission> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let bucket = inner.submissions.entry(submission.tenant_id.clone()).or_default();

        if let Some(existing) = bucket.iter().find(|s| s.submission_id == submission.submission_id) {
            return Ok(existing.clone());
        }

        bucket.push(submission.clone());
        Ok(submission)
    }

    async fn get_submission(&self, tenant_id: &str, submission_id: SubmissionId) -> Result<Option<Submission>> {
        Ok(self
            .inner
            .lock()
            .expect("store lock poisoned")
            .submissions
            .get(tenant_id)
            .and_then(|subs| subs.iter().find(|s| s.submission_id == submission_id).cloned()))
    }

    async fn list_submissions(
        &self,
        tenant_id: &str,
        limit: u32,
        cursor: Option<Cursor>,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Page<Submission>> {
        let after = cursor.as_ref().map(decode_cursor).transpose()?;

        let inner = self.inner.lock().expect("store lock poisoned");
        let mut subs: Vec<Submission> = inner
            .submissions
            .get(tenant_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|s| since.is_none_or(|since| s.submitted_at >= since))
            .filter(|s| until.is_none_or(|until| s.submitted_at < until))
            .collect();
        subs.sort_by(|a, b| b.submission_id.cmp(&a.submission_id));

        let start = match after {
            Some(cursor_id) => subs.iter().position(|s| s.submission_id == cursor_id).map(|i| i + 1).unwrap_or(subs.len()),
            None => 0,
        };

        let page: Vec<Submission> = subs[start..].iter().take(limit as usize).cloned().collect();
        let next_cursor = if start + page.len() < subs.len() {
            page.last().map(|s| encode_cursor(s.submission_id))
        } else {
            None
        };

        Ok(Page { items: page, next_cursor })
    }

    async fn put_delivery_attempt(&self, attempt: DeliveryAttempt) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let key = (attempt.submission_id, attempt.destination_id.clone(), attempt.attempt_number);
        debug_assert!(
            !inner.delivery_attempts.contains_key(&key),
            "attempt_number must be unique per (submission, destination); the audit trail is append-only"
        );
        inner.delivery_attempts.insert(key, attempt);
        Ok(())
    }

    async fn get_delivery_attempt(
        &self,
        submission_id: SubmissionId,
        destination_id: &str,
    ) -> Result<Option<DeliveryAttempt>> {
        Ok(self
            .inner
            .lock()
            .expect("store lock poisoned")
            .delivery_attempts
            .values()
            .filter(|a| a.submission_id == submission_id && a.destination_id == destination_id)
            .max_by_key(|a| a.attempt_number)
            .cloned())
    }

    async fn list_delivery_attempts(&self, submission_id: SubmissionId) -> Result<Vec<DeliveryAttempt>> {
        Ok(self
            .inner
            .lock()
            .expect("store lock poisoned")
            .delivery_attempts
            .values()
            .filter(|a| a.submission_id == submission_id)
            .cloned()
            .collect())
    }

    async fn increment_rate_bucket(
        &self,
        tenant_id: &str,
        window_start: DateTime<Utc>,
        limit: u32,
    ) -> Result<RateBucket> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let key = (tenant_id.to_string(), window_start);
        let count = inner.rate_buckets.entry(key).or_insert(0);
        *count += 1;

        Ok(RateBucket {
            tenant_id: tenant_id.to_string(),
            window_start,
            count: *count,
            limit,
        })
    }

    async fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SubmissionStatus;

    fn submission(tenant_id: &str) -> Submission {
        Submission {
            submission_id: SubmissionId::new(),
            tenant_id: tenant_id.to_string(),
            form_id: "contact".to_string(),
            schema_version: "1.0".to_string(),
            source: None,
            payload: serde_json::json!({}),
            submitted_at: Utc::now(),
            ingested_at: Utc::now(),
            client_ip: None,
            requested_destinations: Vec::new(),
            status: SubmissionStatus::Received,
        }
    }

    fn attempt(submission_id: SubmissionId, destination_id: &str, attempt_number: u32) -> DeliveryAttempt {
        DeliveryAttempt {
            submission_id,
            destination_id: destination_id.to_string(),
            attempt_number,
            state: crate::domain::DeliveryState::Succeeded,
            last_error_kind: None,
            last_attempted_at: Some(Utc::now()),
            next_attempt_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_submission_is_idempotent() {
        let store = InMemorySubmissionStore::new();
        let s = submission("tenant_1");
        let first = store.create_submission(s.clone()).await.unwrap();
        let second = store.create_submission(s.clone()).await.unwrap();
        assert_eq!(first.submission_id, second.submission_id);

        let all = store.list_submissions("tenant_1", 10, None, None, None).await.unwrap();
        assert_eq!(all.items.len(), 1);
    }

    #[tokio::test]
    async fn test_rate_bucket_increments_within_window() {
        let store = InMemorySubmissionStore::new();
        let window = Utc::now();
        let b1 = store.increment_rate_bucket("tenant_1", window, 5).await.unwrap();
        let b2 = store.increment_rate_bucket("tenant_1", window, 5).await.unwrap();
        assert_eq!(b1.count, 1);
        assert_eq!(b2.count, 2);
        assert!(!b2.is_exceeded());
    }

    #[tokio::test]
    async fn test_pagination_cursor_roundtrip() {
        let store = InMemorySubmissionStore::new();
        for _ in 0..5 {
            store.create_submission(submission("tenant_1")).await.unwrap();
        }

        let first_page = store.list_submissions("tenant_1", 2, None, None, None).await.unwrap();
        assert_eq!(first_page.items.len(), 2);
        assert!(first_page.next_cursor.is_some());

        let second_page = store
            .list_submissions("tenant_1", 2, first_page.next_cursor, None, None)
            .await
            .unwrap();
        assert_eq!(second_page.items.len(), 2);
    }

    #[tokio::test]
    async fn test_since_until_filters_by_submitted_at() {
        let store = InMemorySubmissionStore::new();
        let mut old = submission("tenant_1");
        old.submitted_at = Utc::now() - chrono::Duration::hours(2);
        store.create_submission(old).await.unwrap();

        let recent = submission("tenant_1");
        store.create_submission(recent.clone()).await.unwrap();

        let since = Utc::now() - chrono::Duration::hours(1);
        let page = store.list_submissions("tenant_1", 10, None, Some(since), None).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].submission_id, recent.submission_id);
    }

    #[tokio::test]
    async fn test_delivery_attempts_are_append_only_across_attempt_numbers() {
        let store = InMemorySubmissionStore::new();
        let submission_id = SubmissionId::new();

        store.put_delivery_attempt(attempt(submission_id, "dest_1", 1)).await.unwrap();
        store.put_delivery_attempt(attempt(submission_id, "dest_1", 2)).await.unwrap();
        store.put_delivery_attempt(attempt(submission_id, "dest_1", 3)).await.unwrap();

        let attempts = store.list_delivery_attempts(submission_id).await.unwrap();
        assert_eq!(attempts.len(), 3);

        let most_recent = store.get_delivery_attempt(submission_id, "dest_1").await.unwrap().unwrap();
        assert_eq!(most_recent.attempt_number, 3);
    }
}
