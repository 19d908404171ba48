//! Tenant ingest rate limiting (spec §4.10): a fixed one-minute window,
//! counted in the backing store so every server instance shares one limit.

use chrono::{DateTime, Timelike, Utc};

use crate::config::IngestConfig;
use crate::domain::Tier;
use crate::error::{Error, Result};
use crate::ports::SubmissionStore;

/// Returns the limit, in requests per minute, for a tenant's tier.
pub fn limit_for_tier(config: &IngestConfig, tier: Tier) -> u32 {
    match tier {
        Tier::Free => config.tier_limits.free,
        Tier::Starter => config.tier_limits.starter,
        Tier::Pro => config.tier_limits.pro,
    }
}

/// Truncates `now` to the start of its one-minute window.
pub fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(now)
}

/// Checks and records one request against the tenant's limit for the
/// current window, returning [`Error::IngestRateLimited`] once exceeded.
pub async fn check_and_increment(
    store: &dyn SubmissionStore,
    tenant_id: &str,
    tier: Tier,
    config: &IngestConfig,
    now: DateTime<Utc>,
) -> Result<()> {
    let limit = limit_for_tier(config, tier);
    let bucket = store.increment_rate_bucket(tenant_id, window_start(now), limit).await?;

    if bucket.is_exceeded() {
        return Err(Error::IngestRateLimited);
    }

    Ok(())
}
