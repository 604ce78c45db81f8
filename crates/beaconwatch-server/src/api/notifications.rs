//! Recent notifications endpoint.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::state::SharedState;

/// Query parameters for the notifications endpoint.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct NotificationsQuery {
    /// Return at most this many, newest last.
    #[param(example = 20, minimum = 1)]
    pub limit: Option<usize>,
}

/// Recently published notifications.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "count": 1,
    "notifications": [{
        "kind": "reference_data_refreshed",
        "network_id": 42,
        "known_beacons": 12,
        "business_rules": 30
    }]
}))]
pub struct NotificationsResponse {
    /// Number of notifications returned.
    pub count: usize,

    /// Notifications tagged by `kind`, oldest first.
    #[schema(value_type = Vec<Object>)]
    pub notifications: Vec<serde_json::Value>,
}

/// List recent notifications.
#[utoipa::path(
    get,
    path = "/api/notifications",
    tag = "notifications",
    operation_id = "getNotifications",
    summary = "Get recent notifications",
    description = "Returns the notifications kept in the server's ring buffer: \
        `beacon_observed`, `business_rule_matched` and `reference_data_refreshed`.",
    params(NotificationsQuery),
    responses(
        (status = 200, description = "Recent notifications", body = NotificationsResponse)
    )
)]
pub async fn get_notifications(
    State(state): State<SharedState>,
    Query(query): Query<NotificationsQuery>,
) -> Json<NotificationsResponse> {
    let mut notifications = state.recent_notifications();
    if let Some(limit) = query.limit {
        let skip = notifications.len().saturating_sub(limit);
        notifications.drain(..skip);
    }
    Json(NotificationsResponse {
        count: notifications.len(),
        notifications,
    })
}
