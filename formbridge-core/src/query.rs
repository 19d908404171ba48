//! Query API (spec §4.12): lists a tenant's submissions, cursor-paginated and
//! optionally restricted to a `[since, until)` time window.

use chrono::{DateTime, Utc};

use crate::config::QueryConfig;
use crate::domain::Submission;
use crate::error::Result;
use crate::ports::submission_store::{Cursor, Page};
use crate::ports::SubmissionStore;

/// Resolves a caller-supplied `limit` against [`QueryConfig`]'s default/max,
/// per spec §4.12 (absent or zero falls back to the default; anything above
/// the max is clamped).
pub fn resolve_limit(config: &QueryConfig, requested: Option<u32>) -> u32 {
    match requested {
        None | Some(0) => config.default_limit,
        Some(n) => n.min(config.max_limit),
    }
}

/// Lists a tenant's submissions (spec §4.12 `listSubmissionsByTime`).
#[allow(clippy::too_many_arguments)]
pub async fn list_submissions(
    store: &dyn SubmissionStore,
    config: &QueryConfig,
    tenant_id: &str,
    limit: Option<u32>,
    cursor: Option<String>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
) -> Result<Page<Submission>> {
    let limit = resolve_limit(config, limit);
    let cursor = cursor.map(Cursor);
    store.list_submissions(tenant_id, limit, cursor, since, until).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> QueryConfig {
        QueryConfig { default_limit: 50, max_limit: 200 }
    }

    #[test]
    fn test_resolve_limit_defaults() {
        assert_eq!(resolve_limit(&config(), None), 50);
        assert_eq!(resolve_limit(&config(), Some(0)), 50);
    }

    #[test]
    fn test_resolve_limit_clamps_to_max() {
        assert_eq!(resolve_limit(&config(), Some(10_000)), 200);
    }

    #[test]
    fn test_resolve_limit_passes_through_in_range() {
        assert_eq!(resolve_limit(&config(), Some(75)), 75);
    }
}
