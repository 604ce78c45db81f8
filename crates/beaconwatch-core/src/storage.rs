//! Persistent storage for reference data.
//!
//! Each network's known beacons and business rules live in one JSON
//! snapshot file, `networks/<network_id>.json`, replaced atomically on save.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{BeaconError, Result};
use crate::repository::ReferenceSnapshot;
use crate::types::NetworkId;

/// Storage backend for beaconwatch data.
#[derive(Debug, Clone)]
pub struct Storage {
    data_dir: PathBuf,
}

impl Storage {
    /// Create a new storage instance.
    ///
    /// # Arguments
    ///
    /// * `data_dir` - Directory to store data files
    #[must_use]
    pub const fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Storage in the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if no data directory can be determined.
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(default_data_dir()?))
    }

    /// The directory data files are kept in.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Load the snapshot of a network. Returns `None` if none was saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_snapshot(&self, network_id: NetworkId) -> Result<Option<ReferenceSnapshot>> {
        let path = self.snapshot_path(network_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let mut snapshot: ReferenceSnapshot = serde_json::from_str(&content)?;
        snapshot.network_id = network_id;
        debug!(network_id, path = %path.display(), "loaded reference snapshot");
        Ok(Some(snapshot))
    }

    /// Save the snapshot of a network, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_snapshot(&self, snapshot: &ReferenceSnapshot) -> Result<()> {
        let path = self.snapshot_path(snapshot.network_id);
        let parent = path
            .parent()
            .ok_or_else(|| BeaconError::PersistenceError("Invalid snapshot path".into()))?;
        std::fs::create_dir_all(parent)?;

        let content = serde_json::to_string_pretty(snapshot)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;
        debug!(network_id = snapshot.network_id, path = %path.display(), "saved reference snapshot");
        Ok(())
    }

    fn snapshot_path(&self, network_id: NetworkId) -> PathBuf {
        self.data_dir
            .join("networks")
            .join(format!("{network_id}.json"))
    }
}

/// Default data directory.
///
/// On Linux: `/var/lib/beaconwatch/`
/// Elsewhere: the platform data directory, e.g. `~/Library/Application Support/beaconwatch/`
///
/// # Errors
///
/// Returns an error if the platform data directory cannot be determined.
pub fn default_data_dir() -> Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        Ok(PathBuf::from("/var/lib/beaconwatch"))
    }
    #[cfg(not(target_os = "linux"))]
    {
        let dirs = directories::ProjectDirs::from("", "", "beaconwatch").ok_or_else(|| {
            BeaconError::PersistenceError("Cannot determine data directory".into())
        })?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KnownBeacon;

    #[test]
    fn test_missing_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        assert!(storage.load_snapshot(1).unwrap().is_none());
    }

    #[test]
    fn test_save_then_load_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        let snapshot = ReferenceSnapshot {
            network_id: 42,
            known_beacons: vec![KnownBeacon {
                id: 1,
                beacon_id: 7,
                network_id: 42,
                title: "Entrance".into(),
                description: None,
                uuid: "ABCD".into(),
                major: 1,
                minor: 1,
                latitude: Some(52.1),
                longitude: Some(5.1),
                is_geofence: true,
            }],
            business_rules: vec![],
        };

        storage.save_snapshot(&snapshot).unwrap();
        assert!(dir.path().join("networks/42.json").exists());
        assert!(!dir.path().join("networks/42.json.tmp").exists());
        assert_eq!(storage.load_snapshot(42).unwrap(), Some(snapshot));
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("networks")).unwrap();
        std::fs::write(dir.path().join("networks/5.json"), "{ nope").unwrap();

        let storage = Storage::new(dir.path().to_path_buf());
        let err = storage.load_snapshot(5).unwrap_err();
        assert!(err.is_io_error());
    }
}
