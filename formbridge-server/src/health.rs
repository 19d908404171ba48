//! Health check handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use formbridge_core::ports::{EventBus, SubmissionStore};

use crate::state::AppState;

/// Liveness probe response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Readiness probe response with per-port status (spec §4.13).
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub service: String,
    pub dependencies: HashMap<String, DependencyStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub healthy: bool,
}

/// Liveness probe: always 200 while the process is running.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service.name.clone(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    };

    (StatusCode::OK, Json(response))
}

/// Readiness probe: 200 only when the submission store and event bus both
/// report ready, 503 otherwise (spec §4.13). The secret store is excluded —
/// a transient secret-cache miss should not take the service out of rotation.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let store_ready = state.store.is_ready().await;
    let bus_ready = state.bus.is_ready().await;
    let ready = store_ready && bus_ready;

    let mut dependencies = HashMap::new();
    dependencies.insert("submission_store".to_string(), DependencyStatus { healthy: store_ready });
    dependencies.insert("event_bus".to_string(), DependencyStatus { healthy: bus_ready });

    let response = ReadinessResponse {
        ready,
        service: state.config.service.name.clone(),
        dependencies,
    };

    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            service: "test-service".to_string(),
            version: Some("1.0.0".to_string()),
        };

        assert_eq!(response.status, "healthy");
        assert_eq!(response.service, "test-service");
    }

    #[test]
    fn test_dependency_status() {
        let status = DependencyStatus { healthy: true };
        assert!(status.healthy);
    }
}
