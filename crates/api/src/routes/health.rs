//! Health check endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    websocket::RegistryStats,
};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store: String,
    pub connections: RegistryStats,
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store_status = match state.store.ping().await {
        Ok(()) => "healthy",
        Err(e) => {
            tracing::warn!(error = %e, "Chat store health check failed");
            "unhealthy"
        }
    };

    let overall_status = if store_status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        overall_status,
        Json(HealthResponse {
            status: store_status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store: store_status.to_string(),
            connections: state.registry.stats().await,
        }),
    )
}

/// Liveness probe (just returns 200 if the server is running)
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe (checks if the chat store is reachable)
pub async fn readiness(State(state): State<AppState>) -> ApiResult<StatusCode> {
    match state.store.ping().await {
        Ok(()) => Ok(StatusCode::OK),
        Err(e) => {
            tracing::debug!(error = %e, "Readiness check failed");
            Err(ApiError::ServiceUnavailable)
        }
    }
}
