//! OpenAPI specification for the beaconwatch API.
//!
//! Served at `/api/openapi.json` and written to the workspace root by the
//! `gen-openapi` binary for client generation.

use axum::Json;
use beaconwatch_core::{
    BeaconLogBatch, BusinessRule, BusinessRuleType, DeviceInfo, GeofenceRegion, KnownBeacon,
    ReferenceSnapshot, RegionDescriptor, ScanBehavior, ScanStatus, ScannerState, StartRequest,
};
use beaconwatch_core::repository::BeaconLogEntry;
use utoipa::OpenApi;

use super::ble::BleStatusResponse;
use super::error::ErrorResponse;
use super::geofences::{GeofenceEntryRequest, GeofenceEntryResponse};
use super::health::HealthResponse;
use super::notifications::NotificationsResponse;
use super::reference::ReferenceUpdateResponse;
use super::scanner::{ScannerStatusResponse, SetBehaviorRequest};

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// The OpenAPI specification as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> serde_json::Result<String> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for beaconwatch.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "beaconwatch API",
        version = "0.1.0",
        description = r#"
# beaconwatch API

beaconwatch watches for Bluetooth Low Energy proximity beacons and turns
sightings into business-rule notifications.

## Overview

1. **Reference data**: upload the known beacons and business rules of a network
2. **Scanner**: start scanning for that network; one scanner runs at a time
3. **Notifications**: every sighting is published as `beacon_observed`, and
   every satisfied rule (`far`, `close`, `immediate`, `moving_towards`,
   `moving_away_from`) as `business_rule_matched`
4. **Audit**: sightings are buffered and drained as upload batches

Scanner lifecycle calls answer with a `ScanStatus`; check its `success` flag.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local beaconwatch server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "scanner", description = "Radio availability and scanner lifecycle"),
        (name = "reference", description = "Known beacons and business rules per network"),
        (name = "geofences", description = "Geofence regions for beacons with coordinates"),
        (name = "notifications", description = "Recently published notifications"),
        (name = "logs", description = "Audit batches of beacon sightings")
    ),
    paths(
        super::health::health_check,
        super::ble::get_ble_status,
        super::scanner::start_scanner,
        super::scanner::stop_scanner,
        super::scanner::pause_scanner,
        super::scanner::resume_scanner,
        super::scanner::set_behavior,
        super::scanner::get_status,
        super::reference::get_reference,
        super::reference::put_reference,
        super::geofences::list_geofences,
        super::geofences::enter_geofence,
        super::notifications::get_notifications,
        super::logs::flush_logs,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            BleStatusResponse,
            StartRequest,
            ScanBehavior,
            ScanStatus,
            ScannerState,
            ScannerStatusResponse,
            SetBehaviorRequest,
            RegionDescriptor,
            ReferenceSnapshot,
            ReferenceUpdateResponse,
            KnownBeacon,
            BusinessRule,
            BusinessRuleType,
            GeofenceRegion,
            GeofenceEntryRequest,
            GeofenceEntryResponse,
            NotificationsResponse,
            BeaconLogBatch,
            BeaconLogEntry,
            DeviceInfo,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "beaconwatch API");
        assert!(spec.paths.paths.contains_key("/api/scanner/start"));
        assert!(spec
            .paths
            .paths
            .contains_key("/api/networks/{network_id}/reference"));
    }

    #[test]
    fn test_openapi_json_serialization() {
        let json = get_openapi_json().unwrap();
        assert!(json.contains("\"openapi\":"));
        assert!(json.contains("\"beaconwatch API\""));
        assert!(json.contains("ReferenceSnapshot"));
    }
}
