//! Shared domain types and OpenAPI schemas.
//!
//! These are the canonical vocabulary every backend is normalized into: a
//! [`Signal`] per detection, the [`KnownBeacon`] and [`BusinessRule`]
//! reference records it is matched against, and the [`ScanStatus`] returned
//! by host-facing entry points.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::mapper::MapError;

/// Identifier of a beacon network (a tenant's set of beacons).
pub type NetworkId = u64;

/// Identifier of a beacon, shared by known beacons and business rules.
pub type BeaconId = u64;

/// Coarse distance bucket reported for a detection.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Proximity {
    /// The backend could not estimate a distance.
    #[default]
    Unknown,
    /// Several meters away.
    Far,
    /// Within a few meters.
    Near,
    /// Practically touching.
    Immediate,
}

impl Proximity {
    /// The lowercase name used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Far => "far",
            Self::Near => "near",
            Self::Immediate => "immediate",
        }
    }
}

impl fmt::Display for Proximity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Proximity {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "far" => Ok(Self::Far),
            "near" => Ok(Self::Near),
            "immediate" => Ok(Self::Immediate),
            _ => Err(MapError::UnknownProximity(s.to_string())),
        }
    }
}

/// One normalized detection event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "UUID": "F7826DA6-4FA2-4E98-8024-BC5B71E0893E",
    "major": 1,
    "minor": 7,
    "rssi": -62,
    "accuracy": 1.8,
    "proximity": "near"
}))]
pub struct Signal {
    /// Beacon proximity UUID. Compared case-insensitively.
    #[serde(rename = "UUID")]
    pub uuid: String,

    /// Major identifier.
    pub major: u16,

    /// Minor identifier.
    pub minor: u16,

    /// Received signal strength in dBm. `None` when the backend omitted it.
    pub rssi: Option<i32>,

    /// Backend-defined distance estimate in meters; negative when unknown.
    pub accuracy: f64,

    /// Distance bucket.
    pub proximity: Proximity,
}

impl Signal {
    /// Create a signal with an unknown accuracy estimate.
    #[must_use]
    pub fn new(uuid: impl Into<String>, major: u16, minor: u16, rssi: i32, proximity: Proximity) -> Self {
        Self {
            uuid: uuid.into(),
            major,
            minor,
            rssi: Some(rssi),
            accuracy: -1.0,
            proximity,
        }
    }

    /// Set the accuracy estimate.
    #[must_use]
    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = accuracy;
        self
    }

    /// A zero or missing RSSI is an artifact some backends emit for beacons
    /// that already left range.
    #[must_use]
    pub const fn is_out_of_range(&self) -> bool {
        matches!(self.rssi, None | Some(0))
    }
}

/// Geographic position of a known beacon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoLocation {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
}

/// Reference record for a beacon the system is configured to detect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "beacon_id": 7,
    "network_id": 42,
    "title": "Entrance",
    "description": null,
    "UUID": "F7826DA6-4FA2-4E98-8024-BC5B71E0893E",
    "major": 1,
    "minor": 7,
    "latitude": 52.09,
    "longitude": 5.12,
    "is_geofence": false
}))]
pub struct KnownBeacon {
    /// Local record identifier.
    pub id: u64,

    /// Beacon identifier referenced by business rules.
    pub beacon_id: BeaconId,

    /// Network the beacon belongs to.
    pub network_id: NetworkId,

    /// Display title.
    #[serde(default)]
    pub title: String,

    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,

    /// Proximity UUID, stored upper case.
    #[serde(rename = "UUID")]
    pub uuid: String,

    /// Major identifier.
    pub major: u16,

    /// Minor identifier.
    pub minor: u16,

    /// Latitude, if the beacon is placed on a map.
    #[serde(default)]
    pub latitude: Option<f64>,

    /// Longitude, if the beacon is placed on a map.
    #[serde(default)]
    pub longitude: Option<f64>,

    /// Geofence-only entries have no physical radio and are monitored by location.
    #[serde(default)]
    pub is_geofence: bool,
}

impl KnownBeacon {
    /// Upper-case the UUID so lookups and region dedup see one spelling.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.uuid = self.uuid.to_uppercase();
        self
    }

    /// Identity match on (UUID case-insensitive, major, minor).
    #[must_use]
    pub fn matches(&self, uuid: &str, major: u16, minor: u16) -> bool {
        self.major == major && self.minor == minor && self.uuid.eq_ignore_ascii_case(uuid)
    }

    /// Position of the beacon when both coordinates are known.
    #[must_use]
    pub fn location(&self) -> Option<GeoLocation> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoLocation {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

/// Condition under which a business rule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BusinessRuleType {
    /// Signal proximity is `far`.
    Far,
    /// Signal proximity is `near`.
    Close,
    /// Signal proximity is `immediate`.
    Immediate,
    /// The beacon was near and is now near or immediate.
    MovingTowards,
    /// The beacon was near or immediate and is now far.
    MovingAwayFrom,
    /// A type this version does not know; never matches.
    #[serde(other)]
    Unsupported,
}

/// A condition-action binding attached to a beacon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": 3,
    "beacon_id": 7,
    "type": "close",
    "interaction_id": 11,
    "interaction_type": "notification",
    "content": "Welcome in!"
}))]
pub struct BusinessRule {
    /// Business rule identifier.
    pub id: u64,

    /// Beacon this rule belongs to.
    pub beacon_id: BeaconId,

    /// Match condition.
    #[serde(rename = "type")]
    pub rule_type: BusinessRuleType,

    /// Interaction to trigger in the host application.
    #[serde(default)]
    pub interaction_id: Option<u64>,

    /// Kind of interaction (notification, content, ...).
    #[serde(default)]
    pub interaction_type: Option<String>,

    /// Opaque payload handed to the host application.
    #[serde(default)]
    pub content: Option<String>,
}

/// Outcome of a host-facing start/stop style entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "success": true,
    "message": "Scanning started"
}))]
pub struct ScanStatus {
    /// Whether the request was carried out.
    pub success: bool,

    /// Human-readable explanation.
    pub message: String,
}

impl ScanStatus {
    /// A successful status.
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// A refused or failed status.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beacon() -> KnownBeacon {
        KnownBeacon {
            id: 1,
            beacon_id: 7,
            network_id: 42,
            title: "Entrance".into(),
            description: None,
            uuid: "abcd".into(),
            major: 1,
            minor: 1,
            latitude: None,
            longitude: None,
            is_geofence: false,
        }
    }

    #[test]
    fn test_proximity_parsing_is_case_insensitive() {
        assert_eq!("NEAR".parse::<Proximity>().unwrap(), Proximity::Near);
        assert_eq!(" far ".parse::<Proximity>().unwrap(), Proximity::Far);
        assert!("close".parse::<Proximity>().is_err());
    }

    #[test]
    fn test_out_of_range_signal() {
        let mut signal = Signal::new("ABCD", 1, 1, 0, Proximity::Near);
        assert!(signal.is_out_of_range());
        signal.rssi = None;
        assert!(signal.is_out_of_range());
        signal.rssi = Some(-1);
        assert!(!signal.is_out_of_range());
    }

    #[test]
    fn test_known_beacon_identity_match() {
        let beacon = beacon();
        assert!(beacon.matches("ABCD", 1, 1));
        assert!(!beacon.matches("ABCD", 1, 2));
        assert_eq!(beacon.normalized().uuid, "ABCD");
    }

    #[test]
    fn test_known_beacon_defaults_on_deserialize() {
        let json = r#"{"id":1,"beacon_id":7,"network_id":42,"UUID":"abcd","major":1,"minor":1}"#;
        let beacon: KnownBeacon = serde_json::from_str(json).unwrap();
        assert!(!beacon.is_geofence);
        assert!(beacon.location().is_none());
    }

    #[test]
    fn test_unknown_rule_type_is_tolerated() {
        let json = r#"{"id":1,"beacon_id":7,"type":"teleport"}"#;
        let rule: BusinessRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.rule_type, BusinessRuleType::Unsupported);

        let json = r#"{"id":2,"beacon_id":7,"type":"moving_away_from"}"#;
        let rule: BusinessRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.rule_type, BusinessRuleType::MovingAwayFrom);
    }

    #[test]
    fn test_scan_status_serialization() {
        let json = serde_json::to_string(&ScanStatus::failed("nope")).unwrap();
        assert!(json.contains("\"success\":false"));
    }
}
