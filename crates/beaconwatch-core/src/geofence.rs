//! Geofence collaborator.
//!
//! Known beacons flagged `is_geofence` have no radio to range; they are
//! monitored by location instead. The scanner hands them to a
//! [`GeofenceMonitor`], which reports region entries back as
//! [`RawBeaconEvent::GeofenceEntered`] on the channel it was attached to.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::mapper::{geofence_identifier, GeofenceEntry, RawBeaconEvent};
use crate::types::KnownBeacon;

/// Default geofence radius in meters.
pub const DEFAULT_RADIUS_M: f64 = 100.0;

/// A circular region around a geofence-only beacon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeofenceRegion {
    /// `beacon_id|UUID|major|minor`
    pub identifier: String,
    /// Center latitude.
    pub latitude: f64,
    /// Center longitude.
    pub longitude: f64,
    /// Radius in meters.
    pub radius_m: f64,
}

impl GeofenceRegion {
    /// The region for a known beacon. `None` if the beacon has no location.
    #[must_use]
    pub fn from_known_beacon(beacon: &KnownBeacon, radius_m: f64) -> Option<Self> {
        let location = beacon.location()?;
        Some(Self {
            identifier: geofence_identifier(beacon),
            latitude: location.latitude,
            longitude: location.longitude,
            radius_m,
        })
    }
}

/// Location-based monitoring of geofence regions.
pub trait GeofenceMonitor: Send + Sync {
    /// Deliver future entry events to `events`.
    fn attach(&self, events: mpsc::Sender<RawBeaconEvent>);

    /// Stop delivering entry events.
    fn detach(&self);

    /// Start monitoring a region.
    fn start_monitoring(&self, region: GeofenceRegion);

    /// Stop monitoring every region.
    fn stop_monitoring(&self);
}

#[derive(Debug, Default)]
struct MonitorInner {
    regions: Vec<GeofenceRegion>,
    events: Option<mpsc::Sender<RawBeaconEvent>>,
}

/// A geofence monitor driven by the host: it keeps the registered regions
/// and turns [`enter`](Self::enter) calls into entry events.
#[derive(Debug, Default)]
pub struct InMemoryGeofenceMonitor {
    inner: Mutex<MonitorInner>,
}

impl InMemoryGeofenceMonitor {
    /// Create a monitor with no regions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MonitorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Regions currently monitored.
    #[must_use]
    pub fn regions(&self) -> Vec<GeofenceRegion> {
        self.lock().regions.clone()
    }

    /// Report that the device entered the region `identifier`. Returns
    /// `false` if the region is not monitored or nobody is attached.
    pub fn enter(&self, identifier: &str) -> bool {
        let inner = self.lock();
        if !inner.regions.iter().any(|r| r.identifier == identifier) {
            debug!(identifier, "geofence entry for an unmonitored region");
            return false;
        }
        let Some(events) = inner.events.as_ref() else {
            return false;
        };
        let event = RawBeaconEvent::GeofenceEntered(GeofenceEntry {
            identifier: identifier.to_string(),
        });
        match events.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!(identifier, error = %e, "dropping geofence entry");
                false
            }
        }
    }
}

impl GeofenceMonitor for InMemoryGeofenceMonitor {
    fn attach(&self, events: mpsc::Sender<RawBeaconEvent>) {
        self.lock().events = Some(events);
    }

    fn detach(&self) {
        self.lock().events = None;
    }

    fn start_monitoring(&self, region: GeofenceRegion) {
        debug!(identifier = %region.identifier, radius_m = region.radius_m, "monitoring geofence");
        self.lock().regions.push(region);
    }

    fn stop_monitoring(&self) {
        self.lock().regions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geofence_beacon(latitude: Option<f64>) -> KnownBeacon {
        KnownBeacon {
            id: 1,
            beacon_id: 9,
            network_id: 42,
            title: String::new(),
            description: None,
            uuid: "ABCD".into(),
            major: 3,
            minor: 4,
            latitude,
            longitude: Some(5.0),
            is_geofence: true,
        }
    }

    #[test]
    fn test_region_from_known_beacon() {
        let region = GeofenceRegion::from_known_beacon(&geofence_beacon(Some(52.0)), 100.0).unwrap();
        assert_eq!(region.identifier, "9|ABCD|3|4");
        assert!((region.radius_m - 100.0).abs() < f64::EPSILON);

        assert!(GeofenceRegion::from_known_beacon(&geofence_beacon(None), 100.0).is_none());
    }

    #[tokio::test]
    async fn test_enter_only_fires_for_monitored_regions() {
        let monitor = InMemoryGeofenceMonitor::new();
        let (tx, mut rx) = mpsc::channel(4);
        monitor.attach(tx);
        monitor.start_monitoring(
            GeofenceRegion::from_known_beacon(&geofence_beacon(Some(52.0)), 100.0).unwrap(),
        );

        assert!(!monitor.enter("1|FFFF|1|1"));
        assert!(monitor.enter("9|ABCD|3|4"));
        let event = rx.recv().await.unwrap();
        let signal = event.to_signal().unwrap();
        assert_eq!((signal.major, signal.minor), (3, 4));

        monitor.detach();
        assert!(!monitor.enter("9|ABCD|3|4"));

        monitor.stop_monitoring();
        assert!(monitor.regions().is_empty());
    }
}
