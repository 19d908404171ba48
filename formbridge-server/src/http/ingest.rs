//! `POST /ingest` (spec §4.2, §4.13).

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::net::SocketAddr;

use formbridge_core::auth::AuthHeaders;
use formbridge_core::error::Error;
use formbridge_core::ingest::IngestHandler;

use crate::state::AppState;

#[derive(Debug, Serialize)]
struct IngestAcceptedBody {
    ok: bool,
    submission_id: String,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, Error> {
    headers
        .get(name)
        .ok_or_else(|| Error::AuthMissingHeader(name.to_string()))?
        .to_str()
        .map_err(|_| Error::AuthMissingHeader(name.to_string()))
}

/// Prefers `X-Forwarded-For`'s first hop (set by the load balancer this
/// service sits behind) over the raw socket peer address.
fn client_ip(headers: &HeaderMap, connect_info: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .or_else(|| connect_info.map(|addr| addr.ip().to_string()))
}

pub async fn ingest(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    match handle(state, connect_info, headers, body).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn handle(
    state: AppState,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, Error> {
    let tenant_id = header_str(&headers, "x-tenant-id")?;
    let timestamp = header_str(&headers, "x-timestamp")?;
    let signature = header_str(&headers, "x-signature")?;
    let auth_headers = AuthHeaders { tenant_id, timestamp, signature };
    let client_ip = client_ip(&headers, connect_info.map(|ConnectInfo(addr)| addr));

    let handler = IngestHandler::new(
        &state.config.auth,
        &state.config.ingest,
        state.secrets.as_ref(),
        state.store.as_ref(),
        state.bus.as_ref(),
    );

    let accepted = handler.handle(&auth_headers, &body, client_ip).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestAcceptedBody { ok: true, submission_id: accepted.submission_id.to_string() }),
    )
        .into_response())
}
