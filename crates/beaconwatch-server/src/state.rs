//! Application state shared across handlers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use beaconwatch_core::{
    Collaborators, Config, GeofenceMonitor, InMemoryAuditLog, InMemoryGeofenceMonitor,
    InMemoryReferenceRepository, Notification, NotificationBus, ReferenceRefresher, ScanBackend,
    ScannerSlot, Storage, StorageRefresher,
};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// State handed to every handler.
pub type SharedState = Arc<AppState>;

/// The engine and its collaborators, wired for one host process.
pub struct AppState {
    /// Loaded configuration.
    pub config: RwLock<Config>,
    /// The active-scanner slot.
    pub scanner: ScannerSlot,
    /// Committed reference data.
    pub reference: Arc<InMemoryReferenceRepository>,
    /// Buffered audit entries.
    pub audit: Arc<InMemoryAuditLog>,
    /// Geofence regions registered by the scanner.
    pub geofence: Arc<InMemoryGeofenceMonitor>,
    /// Reference-data snapshots on disk.
    pub storage: Storage,
    /// Notifications published by the engine.
    pub bus: NotificationBus,
    /// Name of the scanning backend.
    pub backend_name: &'static str,
    /// When the process started.
    pub started_at: DateTime<Utc>,
    recent: Mutex<VecDeque<serde_json::Value>>,
    history: usize,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("scanner", &self.scanner)
            .field("backend_name", &self.backend_name)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Build the state with storage in the configured data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no data directory can be determined.
    pub fn new(config: Config, backend: Arc<dyn ScanBackend>) -> anyhow::Result<Self> {
        let storage = Storage::new(config.storage.resolve_data_dir()?);
        Ok(Self::with_storage(config, backend, storage))
    }

    /// Build the state over an explicit storage location.
    #[must_use]
    pub fn with_storage(config: Config, backend: Arc<dyn ScanBackend>, storage: Storage) -> Self {
        let bus = NotificationBus::new(config.notifications.capacity);
        let reference = Arc::new(InMemoryReferenceRepository::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let geofence = Arc::new(InMemoryGeofenceMonitor::new());
        let refresher =
            StorageRefresher::new(storage.clone(), Arc::clone(&reference), bus.clone());

        let collaborators = Collaborators {
            known_beacons: reference.clone(),
            business_rules: reference.clone(),
            audit: audit.clone(),
            refresher: Some(Arc::new(refresher) as Arc<dyn ReferenceRefresher>),
            geofence: Some(geofence.clone() as Arc<dyn GeofenceMonitor>),
            bus: bus.clone(),
        };
        let backend_name = backend.name();
        let scanner = ScannerSlot::new(backend, collaborators, config.scanner_options());
        let history = config.notifications.history;

        Self {
            config: RwLock::new(config),
            scanner,
            reference,
            audit,
            geofence,
            storage,
            bus,
            backend_name,
            started_at: Utc::now(),
            recent: Mutex::new(VecDeque::with_capacity(history)),
            history,
        }
    }

    /// Keep `notification` in the recent-notification ring.
    pub fn record(&self, notification: &Notification) {
        if self.history == 0 {
            return;
        }
        let value = match serde_json::to_value(notification) {
            Ok(value) => value,
            Err(e) => {
                warn!(kind = notification.kind(), error = %e, "cannot serialize notification");
                return;
            }
        };
        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        while recent.len() >= self.history {
            recent.pop_front();
        }
        recent.push_back(value);
    }

    /// Recent notifications, oldest first.
    #[must_use]
    pub fn recent_notifications(&self) -> Vec<serde_json::Value> {
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

/// Subscribe to the bus and log and record every notification until the bus
/// closes.
pub fn spawn_notification_recorder(state: SharedState) -> JoinHandle<()> {
    let mut rx = state.bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(notification) => {
                    log_notification(&notification);
                    state.record(&notification);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notification recorder fell behind");
                }
                Err(RecvError::Closed) => {
                    debug!("notification bus closed");
                    break;
                }
            }
        }
    })
}

fn log_notification(notification: &Notification) {
    match notification {
        Notification::BeaconObserved(observed) => debug!(
            uuid = %observed.signal.uuid,
            major = observed.signal.major,
            minor = observed.signal.minor,
            proximity = %observed.signal.proximity,
            known = observed.known_beacon.is_some(),
            "beacon observed"
        ),
        Notification::BusinessRuleMatched(matched) => info!(
            rule_id = matched.business_rule.id,
            beacon_id = matched.known_beacon.beacon_id,
            interaction_id = ?matched.business_rule.interaction_id,
            proximity = %matched.signal.proximity,
            "business rule matched"
        ),
        Notification::ReferenceDataRefreshed(refreshed) => info!(
            network_id = refreshed.network_id,
            known_beacons = refreshed.known_beacons,
            business_rules = refreshed.business_rules,
            "reference data refreshed"
        ),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use beaconwatch_core::MockBackend;

    /// State over a mock backend and a temporary data directory.
    pub fn mock_state(backend: &Arc<MockBackend>) -> (SharedState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.notifications.history = 3;
        let state = AppState::with_storage(
            config,
            Arc::clone(backend) as Arc<dyn ScanBackend>,
            Storage::new(dir.path().to_path_buf()),
        );
        (Arc::new(state), dir)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::mock_state;
    use super::*;
    use beaconwatch_core::notify::ReferenceDataRefreshed;
    use beaconwatch_core::MockBackend;

    fn refreshed(network_id: u64) -> Notification {
        Notification::ReferenceDataRefreshed(ReferenceDataRefreshed {
            network_id,
            known_beacons: 1,
            business_rules: 2,
        })
    }

    #[test]
    fn test_recent_notifications_are_bounded() {
        let (state, _dir) = mock_state(&Arc::new(MockBackend::new()));
        for id in 1..=5 {
            state.record(&refreshed(id));
        }
        let recent = state.recent_notifications();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0]["network_id"], 3);
        assert_eq!(recent[2]["network_id"], 5);
        assert_eq!(recent[2]["kind"], "reference_data_refreshed");
    }

    #[tokio::test]
    async fn test_recorder_keeps_published_notifications() {
        let (state, _dir) = mock_state(&Arc::new(MockBackend::new()));
        let recorder = spawn_notification_recorder(Arc::clone(&state));

        state.bus.publish(refreshed(9));
        for _ in 0..50 {
            if !state.recent_notifications().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(state.recent_notifications()[0]["network_id"], 9);
        recorder.abort();
    }

    #[test]
    fn test_state_follows_config() {
        let (state, _dir) = mock_state(&Arc::new(MockBackend::new()));
        assert_eq!(state.backend_name, "mock");
        assert!(!state.scanner.is_active());
        let config = tokio_test::block_on(state.config.read());
        assert_eq!(config.notifications.history, 3);
    }
}
