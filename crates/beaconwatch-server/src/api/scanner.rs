//! Scanner lifecycle endpoints.
//!
//! The host runs at most one scanner. Lifecycle requests answer with a
//! [`ScanStatus`] and HTTP 200 whether or not they were carried out; the
//! `success` flag and `message` say which. Only malformed input is an error.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use beaconwatch_core::{NetworkId, RegionDescriptor, ScanBehavior, ScanStatus, ScannerState, StartRequest};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the scanner router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/start", post(start_scanner))
        .route("/stop", post(stop_scanner))
        .route("/pause", post(pause_scanner))
        .route("/resume", post(resume_scanner))
        .route("/behavior", post(set_behavior))
        .route("/status", get(get_status))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Current scanner status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "active": true,
    "state": "scanning",
    "network_id": 42,
    "monitored_regions": [
        { "uuid": "F7826DA6-4FA2-4E98-8024-BC5B71E0893E", "identifier": "7" }
    ]
}))]
pub struct ScannerStatusResponse {
    /// Whether a scanner occupies the slot.
    pub active: bool,

    /// Lifecycle state of the active scanner.
    #[schema(nullable)]
    pub state: Option<ScannerState>,

    /// Network the active scanner was initialized for.
    #[schema(nullable, example = 42)]
    pub network_id: Option<NetworkId>,

    /// Regions monitored by the active scanner, one per distinct UUID.
    pub monitored_regions: Vec<RegionDescriptor>,
}

/// Request body for changing the behaviour profile.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({ "behavior": "aggressive" }))]
pub struct SetBehaviorRequest {
    /// Profile name: `proactive` or `aggressive`.
    #[schema(example = "aggressive")]
    pub behavior: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Start scanning for a network.
#[utoipa::path(
    post,
    path = "/api/scanner/start",
    tag = "scanner",
    operation_id = "startScanner",
    summary = "Start scanning",
    description = "Initializes and starts a scanner for the network. Fields left out \
        of the body fall back to the `[scanner]` configuration. Refused while another \
        scanner is active, or when BLE is unsupported or switched off.",
    request_body = StartRequest,
    responses(
        (status = 200, description = "Start outcome", body = ScanStatus)
    )
)]
pub async fn start_scanner(
    State(state): State<SharedState>,
    Json(request): Json<StartRequest>,
) -> Json<ScanStatus> {
    let request = {
        let config = state.config.read().await;
        StartRequest {
            network_id: request.network_id.or(config.scanner.network_id),
            behavior: request.behavior.or(config.scanner.behavior),
        }
    };
    info!(network_id = ?request.network_id, behavior = ?request.behavior, "start requested");
    Json(state.scanner.start(request).await)
}

/// Stop the active scanner.
#[utoipa::path(
    post,
    path = "/api/scanner/stop",
    tag = "scanner",
    operation_id = "stopScanner",
    summary = "Stop scanning",
    description = "Stops the active scanner and releases the radio. Succeeds when no \
        scanner is active.",
    responses(
        (status = 200, description = "Stop outcome", body = ScanStatus)
    )
)]
pub async fn stop_scanner(State(state): State<SharedState>) -> Json<ScanStatus> {
    Json(state.scanner.stop().await)
}

/// Switch the active scanner to the low-power profile.
#[utoipa::path(
    post,
    path = "/api/scanner/pause",
    tag = "scanner",
    operation_id = "pauseScanner",
    summary = "Enter background mode",
    responses(
        (status = 200, description = "Pause outcome", body = ScanStatus)
    )
)]
pub async fn pause_scanner(State(state): State<SharedState>) -> Json<ScanStatus> {
    Json(state.scanner.pause().await)
}

/// Switch the active scanner back to the foreground profile.
#[utoipa::path(
    post,
    path = "/api/scanner/resume",
    tag = "scanner",
    operation_id = "resumeScanner",
    summary = "Leave background mode",
    responses(
        (status = 200, description = "Resume outcome", body = ScanStatus)
    )
)]
pub async fn resume_scanner(State(state): State<SharedState>) -> Json<ScanStatus> {
    Json(state.scanner.resume().await)
}

/// Apply a named behaviour profile to the active scanner.
#[utoipa::path(
    post,
    path = "/api/scanner/behavior",
    tag = "scanner",
    operation_id = "setScanBehavior",
    summary = "Change the behaviour profile",
    description = "Applies `proactive` (battery friendly) or `aggressive` (faster \
        background detection) scan periods to the active scanner.",
    request_body = SetBehaviorRequest,
    responses(
        (status = 200, description = "Behaviour outcome", body = ScanStatus),
        (status = 400, description = "Unknown profile name", body = crate::api::ErrorResponse)
    )
)]
pub async fn set_behavior(
    State(state): State<SharedState>,
    Json(request): Json<SetBehaviorRequest>,
) -> ApiResult<Json<ScanStatus>> {
    let behavior: ScanBehavior = request.behavior.parse()?;
    Ok(Json(state.scanner.set_behavior(behavior)))
}

/// Describe the active scanner.
#[utoipa::path(
    get,
    path = "/api/scanner/status",
    tag = "scanner",
    operation_id = "getScannerStatus",
    summary = "Get scanner status",
    responses(
        (status = 200, description = "Scanner status", body = ScannerStatusResponse)
    )
)]
pub async fn get_status(State(state): State<SharedState>) -> Json<ScannerStatusResponse> {
    let response = match state.scanner.active() {
        Some(scanner) => ScannerStatusResponse {
            active: true,
            state: Some(scanner.state()),
            network_id: scanner.network_id(),
            monitored_regions: scanner.monitored_regions(),
        },
        None => ScannerStatusResponse {
            active: false,
            state: None,
            network_id: None,
            monitored_regions: Vec::new(),
        },
    };
    Json(response)
}
