//! Reference-data and audit collaborators.
//!
//! The engine reads known beacons and business rules through the
//! [`KnownBeaconRepository`] and [`BusinessRuleRepository`] traits and writes
//! observed signals to an [`AuditLog`]. [`InMemoryReferenceRepository`] is the
//! committed reference set used by the server: each network's data is one
//! immutable [`ReferenceSnapshot`] swapped in wholesale, so a concurrent
//! reader sees either the old complete set or the new one, never a mix.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::error::Result;
use crate::notify::{Notification, NotificationBus, ReferenceDataRefreshed};
use crate::storage::Storage;
use crate::types::{BeaconId, BusinessRule, KnownBeacon, NetworkId, Signal};

/// Lookup of known beacons.
pub trait KnownBeaconRepository: Send + Sync {
    /// All known beacons of a network, in stored order.
    fn get_known_beacons(&self, network_id: NetworkId) -> Vec<KnownBeacon>;

    /// The known beacon with this identity (UUID compared case-insensitively).
    fn find_known_beacon(&self, uuid: &str, major: u16, minor: u16) -> Option<KnownBeacon>;
}

/// Lookup of business rules.
pub trait BusinessRuleRepository: Send + Sync {
    /// Every rule attached to a beacon id.
    fn get_business_rules(&self, beacon_id: BeaconId) -> Vec<BusinessRule>;
}

/// Sink for observed signals.
pub trait AuditLog: Send + Sync {
    /// Record one observed signal.
    fn record(&self, signal: &Signal);
}

/// Asynchronous reload of a network's reference data.
#[async_trait]
pub trait ReferenceRefresher: Send + Sync {
    /// Refresh the committed reference data for `network_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source could not be read.
    async fn refresh(&self, network_id: NetworkId) -> Result<()>;
}

/// The complete reference data of one network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReferenceSnapshot {
    /// Network the data belongs to.
    pub network_id: NetworkId,
    /// Known beacons of the network.
    #[serde(default)]
    pub known_beacons: Vec<KnownBeacon>,
    /// Business rules attached to those beacons.
    #[serde(default)]
    pub business_rules: Vec<BusinessRule>,
}

impl ReferenceSnapshot {
    /// An empty snapshot for a network.
    #[must_use]
    pub const fn empty(network_id: NetworkId) -> Self {
        Self {
            network_id,
            known_beacons: Vec::new(),
            business_rules: Vec::new(),
        }
    }

    /// Upper-case every UUID and force the network id onto each known beacon.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let network_id = self.network_id;
        self.known_beacons = self
            .known_beacons
            .into_iter()
            .map(|beacon| KnownBeacon {
                network_id,
                ..beacon.normalized()
            })
            .collect();
        self
    }
}

/// Committed reference data for every network, held in memory.
#[derive(Debug, Default)]
pub struct InMemoryReferenceRepository {
    networks: RwLock<BTreeMap<NetworkId, Arc<ReferenceSnapshot>>>,
}

impl InMemoryReferenceRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a network's reference data wholesale.
    pub fn replace_network(&self, snapshot: ReferenceSnapshot) {
        let snapshot = Arc::new(snapshot.normalized());
        debug!(
            network_id = snapshot.network_id,
            known_beacons = snapshot.known_beacons.len(),
            business_rules = snapshot.business_rules.len(),
            "committing reference data"
        );
        self.networks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.network_id, snapshot);
    }

    /// The committed data for a network, if any was ever committed.
    #[must_use]
    pub fn snapshot(&self, network_id: NetworkId) -> Option<Arc<ReferenceSnapshot>> {
        self.networks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&network_id)
            .cloned()
    }

    fn all(&self) -> Vec<Arc<ReferenceSnapshot>> {
        self.networks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

impl KnownBeaconRepository for InMemoryReferenceRepository {
    fn get_known_beacons(&self, network_id: NetworkId) -> Vec<KnownBeacon> {
        self.snapshot(network_id)
            .map(|snapshot| snapshot.known_beacons.clone())
            .unwrap_or_default()
    }

    fn find_known_beacon(&self, uuid: &str, major: u16, minor: u16) -> Option<KnownBeacon> {
        self.all().iter().find_map(|snapshot| {
            snapshot
                .known_beacons
                .iter()
                .find(|beacon| beacon.matches(uuid, major, minor))
                .cloned()
        })
    }
}

impl BusinessRuleRepository for InMemoryReferenceRepository {
    fn get_business_rules(&self, beacon_id: BeaconId) -> Vec<BusinessRule> {
        self.all()
            .iter()
            .flat_map(|snapshot| snapshot.business_rules.iter())
            .filter(|rule| rule.beacon_id == beacon_id)
            .cloned()
            .collect()
    }
}

/// One audited observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BeaconLogEntry {
    /// Beacon UUID as observed.
    #[serde(rename = "UUID")]
    pub uuid: String,
    /// Major identifier.
    pub major: u16,
    /// Minor identifier.
    pub minor: u16,
    /// Signal strength in dBm.
    pub rssi: Option<i32>,
    /// Distance estimate in meters.
    pub accuracy: f64,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
}

/// The device that produced a batch of audit entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeviceInfo {
    /// Stable device identifier.
    pub device_id: String,
    /// Hardware model.
    pub model: String,
    /// Operating system name.
    pub operating_system: String,
    /// Software version.
    pub version: String,
}

impl DeviceInfo {
    /// Describe the current host.
    #[must_use]
    pub fn current(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            model: std::env::consts::ARCH.to_string(),
            operating_system: std::env::consts::OS.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Audit entries ready to hand to an upload collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BeaconLogBatch {
    /// Identifier of this installation.
    pub instance_ref: String,
    /// Device that observed the beacons.
    pub device: DeviceInfo,
    /// Audited observations, oldest first.
    #[serde(rename = "beaconLogs")]
    pub beacon_logs: Vec<BeaconLogEntry>,
}

/// Audit log buffered in memory until drained.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<BeaconLogEntry>>,
}

impl InMemoryAuditLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every buffered entry as one batch. Returns `None` when empty.
    pub fn drain_batch(
        &self,
        instance_ref: impl Into<String>,
        device: DeviceInfo,
    ) -> Option<BeaconLogBatch> {
        let beacon_logs =
            std::mem::take(&mut *self.entries.lock().unwrap_or_else(PoisonError::into_inner));
        if beacon_logs.is_empty() {
            return None;
        }
        Some(BeaconLogBatch {
            instance_ref: instance_ref.into(),
            device,
            beacon_logs,
        })
    }
}

impl AuditLog for InMemoryAuditLog {
    fn record(&self, signal: &Signal) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(BeaconLogEntry {
                uuid: signal.uuid.clone(),
                major: signal.major,
                minor: signal.minor,
                rssi: signal.rssi,
                accuracy: signal.accuracy,
                timestamp: Utc::now().timestamp(),
            });
    }
}

/// Reloads reference data from snapshot files into the committed repository.
#[derive(Debug, Clone)]
pub struct StorageRefresher {
    storage: Storage,
    repository: Arc<InMemoryReferenceRepository>,
    bus: NotificationBus,
}

impl StorageRefresher {
    /// Create a refresher reading from `storage` into `repository`.
    #[must_use]
    pub const fn new(
        storage: Storage,
        repository: Arc<InMemoryReferenceRepository>,
        bus: NotificationBus,
    ) -> Self {
        Self {
            storage,
            repository,
            bus,
        }
    }
}

#[async_trait]
impl ReferenceRefresher for StorageRefresher {
    async fn refresh(&self, network_id: NetworkId) -> Result<()> {
        let storage = self.storage.clone();
        let snapshot = tokio::task::spawn_blocking(move || storage.load_snapshot(network_id))
            .await
            .map_err(|e| crate::error::BeaconError::PersistenceError(e.to_string()))??
            .unwrap_or_else(|| ReferenceSnapshot::empty(network_id));

        let known_beacons = snapshot.known_beacons.len();
        let business_rules = snapshot.business_rules.len();
        self.repository.replace_network(snapshot);

        info!(network_id, known_beacons, business_rules, "reference data refreshed");
        self.bus
            .publish(Notification::ReferenceDataRefreshed(ReferenceDataRefreshed {
                network_id,
                known_beacons,
                business_rules,
            }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BusinessRuleType, Proximity};

    fn beacon(id: u64, beacon_id: BeaconId, uuid: &str) -> KnownBeacon {
        KnownBeacon {
            id,
            beacon_id,
            network_id: 0,
            title: String::new(),
            description: None,
            uuid: uuid.into(),
            major: 1,
            minor: 1,
            latitude: None,
            longitude: None,
            is_geofence: false,
        }
    }

    fn rule(id: u64, beacon_id: BeaconId, rule_type: BusinessRuleType) -> BusinessRule {
        BusinessRule {
            id,
            beacon_id,
            rule_type,
            interaction_id: None,
            interaction_type: None,
            content: None,
        }
    }

    #[test]
    fn test_replace_network_normalizes() {
        let repo = InMemoryReferenceRepository::new();
        repo.replace_network(ReferenceSnapshot {
            network_id: 42,
            known_beacons: vec![beacon(1, 7, "abcd")],
            business_rules: vec![],
        });

        let beacons = repo.get_known_beacons(42);
        assert_eq!(beacons[0].uuid, "ABCD");
        assert_eq!(beacons[0].network_id, 42);
        assert!(repo.get_known_beacons(43).is_empty());
    }

    #[test]
    fn test_find_known_beacon_is_case_insensitive() {
        let repo = InMemoryReferenceRepository::new();
        repo.replace_network(ReferenceSnapshot {
            network_id: 42,
            known_beacons: vec![beacon(1, 7, "ABCD")],
            business_rules: vec![],
        });

        assert_eq!(repo.find_known_beacon("abcd", 1, 1).unwrap().beacon_id, 7);
        assert!(repo.find_known_beacon("abcd", 1, 2).is_none());
    }

    #[test]
    fn test_replace_is_wholesale() {
        let repo = InMemoryReferenceRepository::new();
        repo.replace_network(ReferenceSnapshot {
            network_id: 42,
            known_beacons: vec![beacon(1, 7, "ABCD"), beacon(2, 8, "EF01")],
            business_rules: vec![rule(1, 7, BusinessRuleType::Close)],
        });
        repo.replace_network(ReferenceSnapshot {
            network_id: 42,
            known_beacons: vec![beacon(3, 9, "1234")],
            business_rules: vec![],
        });

        assert_eq!(repo.get_known_beacons(42).len(), 1);
        assert!(repo.find_known_beacon("ABCD", 1, 1).is_none());
        assert!(repo.get_business_rules(7).is_empty());
    }

    #[test]
    fn test_business_rules_by_beacon() {
        let repo = InMemoryReferenceRepository::new();
        repo.replace_network(ReferenceSnapshot {
            network_id: 42,
            known_beacons: vec![],
            business_rules: vec![
                rule(1, 7, BusinessRuleType::Close),
                rule(2, 7, BusinessRuleType::Far),
                rule(3, 8, BusinessRuleType::Immediate),
            ],
        });

        assert_eq!(repo.get_business_rules(7).len(), 2);
        assert_eq!(repo.get_business_rules(8)[0].id, 3);
    }

    #[test]
    fn test_audit_log_drains_into_batch() {
        let log = InMemoryAuditLog::new();
        assert!(log.drain_batch("ref", DeviceInfo::current("dev")).is_none());

        log.record(&Signal::new("ABCD", 1, 1, -60, Proximity::Near));
        log.record(&Signal::new("ABCD", 1, 2, -70, Proximity::Far));
        assert_eq!(log.len(), 2);

        let batch = log.drain_batch("ref", DeviceInfo::current("dev")).unwrap();
        assert_eq!(batch.beacon_logs.len(), 2);
        assert_eq!(batch.instance_ref, "ref");
        assert!(log.is_empty());

        let json = serde_json::to_value(&batch).unwrap();
        assert!(json["beaconLogs"].is_array());
        assert_eq!(json["device"]["device_id"], "dev");
    }

    #[tokio::test]
    async fn test_storage_refresher_commits_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        storage
            .save_snapshot(&ReferenceSnapshot {
                network_id: 42,
                known_beacons: vec![beacon(1, 7, "abcd")],
                business_rules: vec![rule(1, 7, BusinessRuleType::Close)],
            })
            .unwrap();

        let repo = Arc::new(InMemoryReferenceRepository::new());
        let bus = NotificationBus::new(8);
        let mut rx = bus.subscribe();
        let refresher = StorageRefresher::new(storage, Arc::clone(&repo), bus);

        refresher.refresh(42).await.unwrap();
        assert!(repo.find_known_beacon("ABCD", 1, 1).is_some());
        assert_eq!(rx.try_recv().unwrap().kind(), "reference_data_refreshed");

        refresher.refresh(99).await.unwrap();
        assert!(repo.snapshot(99).unwrap().known_beacons.is_empty());
    }
}
