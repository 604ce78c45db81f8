//! Region bookkeeping.
//!
//! Most native backends reject, or fire twice for, a second monitor request on
//! a UUID that is already monitored. The [`RegionRegistry`] remembers which
//! UUIDs have a live registration so the scanner issues at most one request
//! per UUID. The registry is emptied on stop and rebuilt from scratch on the
//! next start; it is never diffed across restarts.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A monitored beacon region: UUID plus the beacon identifier it was
/// registered for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RegionDescriptor {
    /// Upper-case proximity UUID.
    pub uuid: String,
    /// Identifier handed to the backend (the beacon id).
    pub identifier: String,
}

/// The monitor request sent to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringDescriptor {
    /// Region to monitor.
    pub region: RegionDescriptor,
    /// Report region entry.
    pub notify_on_entry: bool,
    /// Report region exit.
    pub notify_on_exit: bool,
}

/// Alias used where the registry's entries are meant.
pub type MonitoredRegion = RegionDescriptor;

/// Set of regions with a live monitor request, unique per UUID
/// (case-insensitive).
#[derive(Debug, Default, Clone)]
pub struct RegionRegistry {
    regions: Vec<MonitoredRegion>,
}

impl RegionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Whether a region with this UUID is already monitored.
    #[must_use]
    pub fn is_monitoring(&self, uuid: &str) -> bool {
        self.regions
            .iter()
            .any(|region| region.uuid.eq_ignore_ascii_case(uuid))
    }

    /// Record a region. Returns `false` and leaves the registry unchanged if
    /// its UUID is already present.
    pub fn insert(&mut self, region: MonitoredRegion) -> bool {
        if self.is_monitoring(&region.uuid) {
            return false;
        }
        self.regions.push(region);
        true
    }

    /// Forget every region.
    pub fn clear(&mut self) {
        self.regions.clear();
    }

    /// Monitored regions in registration order.
    #[must_use]
    pub fn regions(&self) -> &[MonitoredRegion] {
        &self.regions
    }

    /// Number of monitored regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether nothing is monitored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(uuid: &str, identifier: &str) -> RegionDescriptor {
        RegionDescriptor {
            uuid: uuid.into(),
            identifier: identifier.into(),
        }
    }

    #[test]
    fn test_insert_dedups_case_insensitively() {
        let mut registry = RegionRegistry::new();
        assert!(registry.insert(region("ABCD", "7")));
        assert!(!registry.insert(region("abcd", "8")));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.regions()[0].identifier, "7");
    }

    #[test]
    fn test_distinct_uuids_are_kept() {
        let mut registry = RegionRegistry::new();
        registry.insert(region("ABCD", "7"));
        registry.insert(region("EF01", "8"));
        assert_eq!(registry.len(), 2);
        assert!(registry.is_monitoring("ef01"));
    }

    #[test]
    fn test_clear_empties_registry() {
        let mut registry = RegionRegistry::new();
        registry.insert(region("ABCD", "7"));
        registry.clear();
        assert!(registry.is_empty());
        assert!(!registry.is_monitoring("ABCD"));
    }
}
