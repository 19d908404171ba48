//! `GET /submissions` (spec §4.12, §4.13).

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use formbridge_core::error::Error;
use formbridge_core::query::list_submissions;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmissionsQuery {
    pub tenant_id: String,
    pub limit: Option<u32>,
    pub cursor: Option<String>,
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    pub until: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Serialize)]
struct SubmissionSummary {
    submission_id: String,
    form_id: String,
    submitted_at: chrono::DateTime<chrono::Utc>,
    status: formbridge_core::domain::SubmissionStatus,
    payload_preview: String,
}

#[derive(Debug, Serialize)]
struct SubmissionsResponse {
    items: Vec<SubmissionSummary>,
    next_cursor: Option<String>,
}

/// `tenant_id` in the query must match the caller's authenticated tenant
/// (spec §4.12). Session authentication is an external collaborator's
/// concern; this surface trusts `X-Tenant-Id` as the authenticated identity,
/// consistent with the HMAC tenant context established at ingest time.
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<SubmissionsQuery>,
    headers: axum::http::HeaderMap,
) -> Response {
    match handle(state, params, headers).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn handle(
    state: AppState,
    params: SubmissionsQuery,
    headers: axum::http::HeaderMap,
) -> Result<Response, Error> {
    let authenticated_tenant = headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::AuthMissingHeader("X-Tenant-Id".to_string()))?;

    if authenticated_tenant != params.tenant_id {
        return Err(Error::AuthTenantMismatch);
    }

    let page = list_submissions(
        state.store.as_ref(),
        &state.config.query,
        &params.tenant_id,
        params.limit,
        params.cursor,
        params.since,
        params.until,
    )
    .await?;

    let items = page
        .items
        .into_iter()
        .map(|s| {
            let serialized = serde_json::to_string(&s.payload).unwrap_or_default();
            let preview: String = serialized.chars().take(256).collect();
            SubmissionSummary {
                submission_id: s.submission_id.to_string(),
                form_id: s.form_id,
                submitted_at: s.submitted_at,
                status: s.status,
                payload_preview: preview,
            }
        })
        .collect();

    Ok(Json(SubmissionsResponse {
        items,
        next_cursor: page.next_cursor.map(|c| c.0),
    })
    .into_response())
}
