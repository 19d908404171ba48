//! Local in-process rate limiting, belt-and-suspenders alongside the
//! store-backed per-tenant limiter in [`formbridge_core::rate_limit`]
//! (spec §4.10). This layer is tenant-blind: it bounds total request
//! throughput on this process, protecting it from being overwhelmed before
//! a request ever reaches authentication.

use axum::{
    http::StatusCode,
    middleware::Next,
    extract::State,
    response::{IntoResponse, Response},
};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use formbridge_core::config::LocalRateLimitConfig;
use formbridge_core::error::{Error, Result as CoreResult};

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Shared, process-wide governor limiter.
#[derive(Clone)]
pub struct GovernorRateLimit {
    limiter: Arc<Limiter>,
}

impl GovernorRateLimit {
    pub fn new(config: &LocalRateLimitConfig) -> Self {
        let burst = NonZeroU32::new(config.burst_size.max(1)).expect("burst is non-zero");
        let quota = Quota::with_period(config.period() / config.requests_per_period.max(1))
            .expect("period is non-zero")
            .allow_burst(burst);

        Self { limiter: Arc::new(RateLimiter::direct(quota)) }
    }

    pub fn check(&self) -> CoreResult<()> {
        self.limiter.check().map_err(|_| Error::IngestRateLimited)
    }
}

/// Axum middleware function rejecting requests once the local quota is exhausted.
pub async fn governor_middleware(
    State(limiter): State<GovernorRateLimit>,
    req: axum::extract::Request,
    next: Next,
) -> Response {
    if limiter.check().is_err() {
        return (StatusCode::TOO_MANY_REQUESTS, "rate limited").into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_burst_then_rejects() {
        let config = LocalRateLimitConfig { requests_per_period: 60, period_secs: 60, burst_size: 2 };
        let limiter = GovernorRateLimit::new(&config);

        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }
}
