//! Radio availability endpoint.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// BLE availability of the host radio.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "supported": true,
    "enabled": false,
    "backend": "bluez"
}))]
pub struct BleStatusResponse {
    /// Whether the hardware supports Bluetooth Low Energy.
    pub supported: bool,

    /// Whether the radio is switched on.
    pub enabled: bool,

    /// Scanning backend that answered.
    #[schema(example = "bluez")]
    pub backend: String,
}

/// Report whether BLE is supported and enabled.
#[utoipa::path(
    get,
    path = "/api/ble",
    tag = "scanner",
    operation_id = "getBleStatus",
    summary = "Check BLE availability",
    description = "Asks the scanning backend whether the radio supports Bluetooth Low \
        Energy and whether it is switched on. A scan can only start when both are true.",
    responses(
        (status = 200, description = "Radio availability", body = BleStatusResponse)
    )
)]
pub async fn get_ble_status(State(state): State<SharedState>) -> Json<BleStatusResponse> {
    let supported = state.scanner.is_ble_supported().await;
    let enabled = supported && state.scanner.is_ble_enabled().await;

    Json(BleStatusResponse {
        supported,
        enabled,
        backend: state.backend_name.to_string(),
    })
}
