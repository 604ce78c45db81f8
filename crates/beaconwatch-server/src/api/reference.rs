//! Reference-data endpoints.
//!
//! A network's known beacons and business rules are replaced wholesale. A
//! replacement is written to disk first, then committed in memory, and a
//! scanner running that network is restarted so its regions, geofences and
//! directional state match the new data.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use beaconwatch_core::notify::ReferenceDataRefreshed;
use beaconwatch_core::{NetworkId, Notification, ReferenceSnapshot, StartRequest};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the reference-data router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/{network_id}/reference", get(get_reference).put(put_reference))
}

/// Outcome of a reference-data replacement.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "network_id": 42,
    "known_beacons": 12,
    "business_rules": 30,
    "scanner_restarted": true
}))]
pub struct ReferenceUpdateResponse {
    /// The replaced network.
    pub network_id: NetworkId,

    /// Known beacons now committed.
    pub known_beacons: usize,

    /// Business rules now committed.
    pub business_rules: usize,

    /// Whether the active scanner was restarted to pick up the change.
    pub scanner_restarted: bool,
}

/// Get the committed reference data of a network.
#[utoipa::path(
    get,
    path = "/api/networks/{network_id}/reference",
    tag = "reference",
    operation_id = "getReference",
    summary = "Get a network's reference data",
    description = "Returns the known beacons and business rules committed for the \
        network, falling back to the snapshot stored on disk.",
    params(("network_id" = u64, Path, description = "Network identifier")),
    responses(
        (status = 200, description = "Committed reference data", body = ReferenceSnapshot),
        (status = 404, description = "No reference data for this network", body = crate::api::ErrorResponse)
    )
)]
pub async fn get_reference(
    State(state): State<SharedState>,
    Path(network_id): Path<NetworkId>,
) -> ApiResult<Json<ReferenceSnapshot>> {
    if let Some(snapshot) = state.reference.snapshot(network_id) {
        return Ok(Json(snapshot.as_ref().clone()));
    }

    let storage = state.storage.clone();
    let stored = tokio::task::spawn_blocking(move || storage.load_snapshot(network_id)).await??;
    stored.map(Json).ok_or_else(|| {
        ApiError::not_found(
            "NETWORK_NOT_FOUND",
            format!("No reference data for network {network_id}"),
        )
    })
}

/// Replace the reference data of a network.
#[utoipa::path(
    put,
    path = "/api/networks/{network_id}/reference",
    tag = "reference",
    operation_id = "putReference",
    summary = "Replace a network's reference data",
    description = "Persists the snapshot, commits it and publishes a \
        `reference_data_refreshed` notification. A scanner running this network is \
        restarted. The body's `network_id` must match the path.",
    params(("network_id" = u64, Path, description = "Network identifier")),
    request_body = ReferenceSnapshot,
    responses(
        (status = 200, description = "Reference data replaced", body = ReferenceUpdateResponse),
        (status = 400, description = "Network identifiers disagree", body = crate::api::ErrorResponse)
    )
)]
pub async fn put_reference(
    State(state): State<SharedState>,
    Path(network_id): Path<NetworkId>,
    Json(snapshot): Json<ReferenceSnapshot>,
) -> ApiResult<Json<ReferenceUpdateResponse>> {
    if snapshot.network_id != network_id {
        return Err(ApiError::bad_request(
            "NETWORK_ID_MISMATCH",
            format!(
                "Body is for network {} but the path names network {network_id}",
                snapshot.network_id
            ),
        ));
    }
    let snapshot = snapshot.normalized();

    let storage = state.storage.clone();
    let to_save = snapshot.clone();
    tokio::task::spawn_blocking(move || storage.save_snapshot(&to_save)).await??;

    let known_beacons = snapshot.known_beacons.len();
    let business_rules = snapshot.business_rules.len();
    state.reference.replace_network(snapshot);
    state
        .bus
        .publish(Notification::ReferenceDataRefreshed(ReferenceDataRefreshed {
            network_id,
            known_beacons,
            business_rules,
        }));
    info!(network_id, known_beacons, business_rules, "reference data replaced");

    let running = state
        .scanner
        .active()
        .is_some_and(|scanner| scanner.network_id() == Some(network_id));
    let scanner_restarted = running && restart_scanner(&state, network_id).await;

    Ok(Json(ReferenceUpdateResponse {
        network_id,
        known_beacons,
        business_rules,
        scanner_restarted,
    }))
}

async fn restart_scanner(state: &SharedState, network_id: NetworkId) -> bool {
    state.scanner.stop().await;
    let behavior = state.config.read().await.scanner.behavior;
    let status = state
        .scanner
        .start(StartRequest {
            network_id: Some(network_id),
            behavior,
        })
        .await;
    if !status.success {
        warn!(network_id, message = %status.message, "scanner did not restart");
    }
    status.success
}
