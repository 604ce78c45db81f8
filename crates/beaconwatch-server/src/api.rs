//! HTTP API routes and handlers.
//!
//! Endpoints are organized by domain:
//! - `health` - Service health checks
//! - `ble` - Radio availability
//! - `scanner` - Scanner lifecycle and behaviour profiles
//! - `reference` - Per-network known beacons and business rules
//! - `geofences` - Geofence regions and entries
//! - `notifications` - Recently published notifications
//! - `logs` - Audit batch flushing
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::{get, post};
use axum::Router;

use crate::state::SharedState;

pub mod ble;
pub mod error;
pub mod geofences;
pub mod health;
pub mod logs;
pub mod notifications;
pub mod openapi;
pub mod reference;
pub mod scanner;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                          - Health check
/// /api
/// ├── /ble                         - BLE supported / enabled
/// ├── /scanner/{start,stop,pause,resume,behavior,status}
/// ├── /networks/{id}/reference     - Get or replace reference data
/// ├── /geofences                   - Monitored regions, entries
/// ├── /notifications               - Recent notifications
/// ├── /logs/flush                  - Drain the audit buffer
/// └── /openapi.json                - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/ble", get(ble::get_ble_status))
                .route("/notifications", get(notifications::get_notifications))
                .route("/logs/flush", post(logs::flush_logs))
                .route("/openapi.json", get(openapi::get_openapi_spec))
                .nest("/scanner", scanner::router())
                .nest("/networks", reference::router())
                .nest("/geofences", geofences::router()),
        )
        .with_state(state)
}
