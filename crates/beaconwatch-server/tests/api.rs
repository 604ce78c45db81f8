//! HTTP tests over the mock backend.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use beaconwatch_core::mapper::RangedBeacon;
use beaconwatch_core::scanner::mock::BackendCall;
use beaconwatch_core::{Config, MockBackend, RawBeaconEvent, ScanBackend, Storage};
use beaconwatch_server::api::create_router;
use beaconwatch_server::state::{spawn_notification_recorder, AppState, SharedState};
use serde_json::{json, Value};
use tempfile::TempDir;

struct Harness {
    server: TestServer,
    state: SharedState,
    backend: Arc<MockBackend>,
    _dir: TempDir,
}

fn harness_with(backend: MockBackend) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(backend);
    let state = Arc::new(AppState::with_storage(
        Config::default(),
        Arc::clone(&backend) as Arc<dyn ScanBackend>,
        Storage::new(dir.path().to_path_buf()),
    ));
    spawn_notification_recorder(Arc::clone(&state));
    let server = TestServer::new(create_router(Arc::clone(&state))).unwrap();
    Harness {
        server,
        state,
        backend,
        _dir: dir,
    }
}

fn harness() -> Harness {
    harness_with(MockBackend::new())
}

fn reference(network_id: u64) -> Value {
    json!({
        "network_id": network_id,
        "known_beacons": [
            { "id": 1, "beacon_id": 7, "network_id": network_id, "title": "Entrance",
              "UUID": "abcd", "major": 1, "minor": 1 },
            { "id": 2, "beacon_id": 10, "network_id": network_id, "title": "Parking",
              "UUID": "1234", "major": 5, "minor": 6,
              "latitude": 52.09, "longitude": 5.12, "is_geofence": true }
        ],
        "business_rules": [
            { "id": 1, "beacon_id": 7, "type": "close", "interaction_id": 11,
              "interaction_type": "notification", "content": "Welcome in!" }
        ]
    })
}

fn near(uuid: &str) -> RawBeaconEvent {
    RawBeaconEvent::Ranged(RangedBeacon {
        uuid: uuid.into(),
        major: 1,
        minor: 1,
        rssi: Some(-60),
        accuracy: 1.2,
        proximity: "near".into(),
    })
}

async fn wait_for_kind(state: &SharedState, kind: &str) -> Value {
    for _ in 0..200 {
        if let Some(found) = state
            .recent_notifications()
            .into_iter()
            .find(|n| n["kind"] == kind)
        {
            return found;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no {kind} notification recorded");
}

async fn put_reference(h: &Harness, network_id: u64) -> Value {
    let response = h
        .server
        .put(&format!("/api/networks/{network_id}/reference"))
        .json(&reference(network_id))
        .await;
    response.assert_status_ok();
    response.json()
}

async fn start(h: &Harness, body: Value) -> Value {
    let response = h.server.post("/api/scanner/start").json(&body).await;
    response.assert_status_ok();
    response.json()
}

#[tokio::test]
async fn test_health_and_ble_status() {
    let h = harness_with(MockBackend::new().with_ble_enabled(false));

    let health: Value = h.server.get("/health").await.json();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["backend"], "mock");

    let ble: Value = h.server.get("/api/ble").await.json();
    assert_eq!(ble["supported"], true);
    assert_eq!(ble["enabled"], false);
}

#[tokio::test]
async fn test_rule_match_reaches_notifications_and_audit() {
    let h = harness();
    let updated = put_reference(&h, 42).await;
    assert_eq!(updated["known_beacons"], 2);
    assert_eq!(updated["scanner_restarted"], false);

    let status = start(&h, json!({ "network_id": 42 })).await;
    assert_eq!(status["success"], true, "{status}");

    let scanner: Value = h.server.get("/api/scanner/status").await.json();
    assert_eq!(scanner["active"], true);
    assert_eq!(scanner["state"], "scanning");
    assert_eq!(scanner["network_id"], 42);
    assert_eq!(scanner["monitored_regions"][0]["uuid"], "ABCD");

    assert!(h.backend.emit(near("ABCD")));
    let matched = wait_for_kind(&h.state, "business_rule_matched").await;
    assert_eq!(matched["business_rule"]["type"], "close");
    assert_eq!(matched["known_beacon"]["beacon_id"], 7);

    let notifications: Value = h.server.get("/api/notifications?limit=1").await.json();
    assert_eq!(notifications["count"], 1);
    assert_eq!(notifications["notifications"][0]["kind"], "business_rule_matched");

    let flushed = h.server.post("/api/logs/flush").await;
    flushed.assert_status_ok();
    let batch: Value = flushed.json();
    assert_eq!(batch["beaconLogs"].as_array().unwrap().len(), 1);
    assert_eq!(batch["beaconLogs"][0]["UUID"], "ABCD");

    h.server
        .post("/api/logs/flush")
        .await
        .assert_status(StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_start_falls_back_to_configured_network() {
    let h = harness();
    let missing = start(&h, json!({})).await;
    assert_eq!(missing["success"], false);
    assert!(!h.state.scanner.is_active());

    h.state.config.write().await.scanner.network_id = Some(5);
    let status = start(&h, json!({})).await;
    assert_eq!(status["success"], true, "{status}");

    let scanner: Value = h.server.get("/api/scanner/status").await.json();
    assert_eq!(scanner["network_id"], 5);
}

#[tokio::test]
async fn test_second_start_is_refused() {
    let h = harness();
    assert_eq!(start(&h, json!({ "network_id": 42 })).await["success"], true);

    let second = start(&h, json!({ "network_id": 43 })).await;
    assert_eq!(second["success"], false);
    assert_eq!(second["message"], "Scanner already started; stop it first");
    assert_eq!(h.backend.count_calls(|c| c == &BackendCall::Bind), 1);
}

#[tokio::test]
async fn test_disabled_radio_refuses_start() {
    let h = harness_with(MockBackend::new().with_ble_enabled(false));
    let status = start(&h, json!({ "network_id": 42 })).await;
    assert_eq!(status["success"], false);
    assert_eq!(status["message"], "Scan not started because BLE is not enabled");
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn test_stop_pause_resume() {
    let h = harness();
    let paused: Value = h.server.post("/api/scanner/pause").await.json();
    assert_eq!(paused["success"], false);

    start(&h, json!({ "network_id": 42 })).await;
    let paused: Value = h.server.post("/api/scanner/pause").await.json();
    assert_eq!(paused["success"], true);
    assert!(h.backend.background_mode());
    let scanner: Value = h.server.get("/api/scanner/status").await.json();
    assert_eq!(scanner["state"], "backgrounded");

    let resumed: Value = h.server.post("/api/scanner/resume").await.json();
    assert_eq!(resumed["success"], true);
    assert!(!h.backend.background_mode());

    let stopped: Value = h.server.post("/api/scanner/stop").await.json();
    assert_eq!(stopped["message"], "Scanning stopped");
    let again: Value = h.server.post("/api/scanner/stop").await.json();
    assert_eq!(again["success"], true);
    assert_eq!(again["message"], "No active scanner");
    assert!(!h.backend.is_listening());
}

#[tokio::test]
async fn test_behavior_profiles() {
    let h = harness();
    start(&h, json!({ "network_id": 42 })).await;

    let applied: Value = h
        .server
        .post("/api/scanner/behavior")
        .json(&json!({ "behavior": "Aggressive" }))
        .await
        .json();
    assert_eq!(applied["success"], true);
    assert_eq!(h.backend.scan_periods().unwrap().background_between_scan_ms, 5001);

    let unknown = h
        .server
        .post("/api/scanner/behavior")
        .json(&json!({ "behavior": "turbo" }))
        .await;
    unknown.assert_status_bad_request();
    let error: Value = unknown.json();
    assert_eq!(error["error"], "UNKNOWN_BEHAVIOR");
}

#[tokio::test]
async fn test_reference_round_trip_and_mismatch() {
    let h = harness();
    h.server
        .get("/api/networks/42/reference")
        .await
        .assert_status_not_found();

    put_reference(&h, 42).await;
    let snapshot: Value = h.server.get("/api/networks/42/reference").await.json();
    assert_eq!(snapshot["known_beacons"][0]["UUID"], "ABCD");
    assert_eq!(snapshot["business_rules"][0]["type"], "close");
    assert!(h.state.storage.load_snapshot(42).unwrap().is_some());

    let refreshed = wait_for_kind(&h.state, "reference_data_refreshed").await;
    assert_eq!(refreshed["network_id"], 42);

    let mismatch = h
        .server
        .put("/api/networks/43/reference")
        .json(&reference(42))
        .await;
    mismatch.assert_status_bad_request();
    let error: Value = mismatch.json();
    assert_eq!(error["error"], "NETWORK_ID_MISMATCH");
}

#[tokio::test]
async fn test_replacing_running_network_restarts_scanner() {
    let h = harness();
    start(&h, json!({ "network_id": 42 })).await;
    assert!(h.state.geofence.regions().is_empty());

    let updated = put_reference(&h, 42).await;
    assert_eq!(updated["scanner_restarted"], true);
    assert_eq!(h.backend.count_calls(|c| c == &BackendCall::Bind), 2);
    assert_eq!(h.state.geofence.regions().len(), 1);

    let other = put_reference(&h, 7).await;
    assert_eq!(other["scanner_restarted"], false);
    assert_eq!(h.backend.count_calls(|c| c == &BackendCall::Bind), 2);
}

#[tokio::test]
async fn test_geofence_entry() {
    let h = harness();
    let unmonitored = h
        .server
        .post("/api/geofences/enter")
        .json(&json!({ "identifier": "10|1234|5|6" }))
        .await;
    unmonitored.assert_status_not_found();

    put_reference(&h, 42).await;
    start(&h, json!({ "network_id": 42 })).await;
    let regions: Value = h.server.get("/api/geofences").await.json();
    assert_eq!(regions[0]["identifier"], "10|1234|5|6");

    let entered = h
        .server
        .post("/api/geofences/enter")
        .json(&json!({ "identifier": "10|1234|5|6" }))
        .await;
    entered.assert_status(StatusCode::ACCEPTED);

    let observed = wait_for_kind(&h.state, "beacon_observed").await;
    assert_eq!(observed["known_beacon"]["beacon_id"], 10);
    assert_eq!(observed["signal"]["rssi"], -1);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let h = harness();
    let spec: Value = h.server.get("/api/openapi.json").await.json();
    assert_eq!(spec["info"]["title"], "beaconwatch API");
    assert!(spec["paths"]["/api/logs/flush"].is_object());
}
