//! Geofence endpoints.
//!
//! The host's location service reports region entries here; the scanner
//! registered those regions for known beacons that carry coordinates.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use beaconwatch_core::GeofenceRegion;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the geofence router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_geofences))
        .route("/enter", post(enter_geofence))
}

/// A region entry reported by the location service.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({ "identifier": "10|F7826DA6-4FA2-4E98-8024-BC5B71E0893E|5|6" }))]
pub struct GeofenceEntryRequest {
    /// Region identifier: `beacon_id|UUID|major|minor` of the known beacon.
    pub identifier: String,
}

/// Acknowledgement of a region entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeofenceEntryResponse {
    /// The entry was handed to the scanner.
    pub accepted: bool,
    /// The region identifier.
    pub identifier: String,
}

/// List the geofence regions currently monitored.
#[utoipa::path(
    get,
    path = "/api/geofences",
    tag = "geofences",
    operation_id = "listGeofences",
    summary = "List monitored geofences",
    responses(
        (status = 200, description = "Monitored regions", body = [GeofenceRegion])
    )
)]
pub async fn list_geofences(State(state): State<SharedState>) -> Json<Vec<GeofenceRegion>> {
    Json(state.geofence.regions())
}

/// Report entry into a monitored geofence.
#[utoipa::path(
    post,
    path = "/api/geofences/enter",
    tag = "geofences",
    operation_id = "enterGeofence",
    summary = "Report a geofence entry",
    description = "Feeds a geofence entry to the active scanner, which treats it as an \
        observation of the beacon the region belongs to.",
    request_body = GeofenceEntryRequest,
    responses(
        (status = 202, description = "Entry accepted", body = GeofenceEntryResponse),
        (status = 404, description = "Region not monitored or no scanner listening", body = crate::api::ErrorResponse)
    )
)]
pub async fn enter_geofence(
    State(state): State<SharedState>,
    Json(request): Json<GeofenceEntryRequest>,
) -> ApiResult<(StatusCode, Json<GeofenceEntryResponse>)> {
    if !state.geofence.enter(&request.identifier) {
        return Err(ApiError::not_found(
            "GEOFENCE_NOT_MONITORED",
            format!("Geofence {} is not monitored by an active scanner", request.identifier),
        ));
    }
    Ok((
        StatusCode::ACCEPTED,
        Json(GeofenceEntryResponse {
            accepted: true,
            identifier: request.identifier,
        }),
    ))
}
