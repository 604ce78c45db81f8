//! Health check API endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "status": "ok",
    "version": "0.1.0",
    "backend": "bluez",
    "scanner_active": true,
    "uptime_seconds": 3600
}))]
pub struct HealthResponse {
    /// Service status.
    #[schema(example = "ok")]
    pub status: String,

    /// Service version from Cargo.toml.
    #[schema(example = "0.1.0")]
    pub version: String,

    /// Scanning backend in use.
    #[schema(example = "bluez")]
    pub backend: String,

    /// Whether a scanner is currently active.
    #[schema(example = true)]
    pub scanner_active: bool,

    /// Seconds since the server started.
    #[schema(example = 3600, minimum = 0)]
    pub uptime_seconds: i64,
}

/// Creates the health router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(health_check))
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    operation_id = "healthCheck",
    summary = "Check service health",
    description = "Returns the service version, the scanning backend and whether a \
        scanner is active. Use this endpoint for supervisor health checks.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.backend_name.to_string(),
        scanner_active: state.scanner.is_active(),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds().max(0),
    })
}
