//! Audit log endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use beaconwatch_core::{BeaconLogBatch, DeviceInfo};
use tracing::debug;

use crate::state::SharedState;

/// Take every buffered sighting as one upload batch.
#[utoipa::path(
    post,
    path = "/api/logs/flush",
    tag = "logs",
    operation_id = "flushBeaconLogs",
    summary = "Flush the audit buffer",
    description = "Drains the sightings recorded since the last flush into a batch \
        tagged with this installation and device. Answers 204 when nothing was recorded.",
    responses(
        (status = 200, description = "Drained batch", body = BeaconLogBatch),
        (status = 204, description = "Nothing recorded since the last flush")
    )
)]
pub async fn flush_logs(State(state): State<SharedState>) -> Response {
    let (instance_ref, device_id) = {
        let config = state.config.read().await;
        (config.audit.instance_ref.clone(), config.audit.device_id.clone())
    };
    match state
        .audit
        .drain_batch(instance_ref, DeviceInfo::current(device_id))
    {
        Some(batch) => {
            debug!(entries = batch.beacon_logs.len(), "audit batch flushed");
            Json(batch).into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
