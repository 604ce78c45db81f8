//! Directional state per beacon.
//!
//! Keeps exactly one observation per beacon id, the most recent proximity,
//! and answers whether a new observation means the device is moving towards
//! or away from that beacon. The two predicates are asymmetric:
//!
//! | previous            | new                 | towards | away  |
//! |---------------------|---------------------|---------|-------|
//! | near                | near / immediate    | true    | false |
//! | near / immediate    | far                 | false   | true  |
//! | none                | anything            | false   | false |
//!
//! Any other combination is false for both.

use std::collections::HashMap;

use crate::types::{BeaconId, Proximity};

/// Last observed proximity per beacon id. Session scoped, never persisted.
#[derive(Debug, Default, Clone)]
pub struct DirectionalStateTracker {
    last_seen: HashMap<BeaconId, Proximity>,
}

impl DirectionalStateTracker {
    /// Create a tracker with no observations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored observation for a beacon, if any.
    #[must_use]
    pub fn last_proximity(&self, beacon_id: BeaconId) -> Option<Proximity> {
        self.last_seen.get(&beacon_id).copied()
    }

    /// True iff the beacon was last seen `near` and is now `near` or `immediate`.
    #[must_use]
    pub fn moving_towards(&self, beacon_id: BeaconId, new_proximity: Proximity) -> bool {
        self.last_proximity(beacon_id) == Some(Proximity::Near)
            && matches!(new_proximity, Proximity::Near | Proximity::Immediate)
    }

    /// True iff the beacon was last seen `near` or `immediate` and is now `far`.
    #[must_use]
    pub fn moving_away_from(&self, beacon_id: BeaconId, new_proximity: Proximity) -> bool {
        matches!(
            self.last_proximity(beacon_id),
            Some(Proximity::Near | Proximity::Immediate)
        ) && new_proximity == Proximity::Far
    }

    /// Replace the stored observation for a beacon.
    pub fn record(&mut self, beacon_id: BeaconId, proximity: Proximity) {
        self.last_seen.insert(beacon_id, proximity);
    }

    /// Drop every observation.
    pub fn clear(&mut self) {
        self.last_seen.clear();
    }

    /// Number of beacons with a stored observation.
    #[must_use]
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    /// Whether no beacon has been observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Proximity::{Far, Immediate, Near, Unknown};

    #[test]
    fn test_unobserved_beacon_has_no_direction() {
        let tracker = DirectionalStateTracker::new();
        for p in [Unknown, Far, Near, Immediate] {
            assert!(!tracker.moving_towards(1, p));
            assert!(!tracker.moving_away_from(1, p));
        }
    }

    #[test]
    fn test_moving_towards_requires_prior_near() {
        let mut tracker = DirectionalStateTracker::new();
        tracker.record(1, Near);
        assert!(tracker.moving_towards(1, Near));
        assert!(tracker.moving_towards(1, Immediate));
        assert!(!tracker.moving_towards(1, Far));

        tracker.record(1, Immediate);
        assert!(!tracker.moving_towards(1, Immediate));

        tracker.record(1, Far);
        assert!(!tracker.moving_towards(1, Near));
    }

    #[test]
    fn test_moving_away_from_requires_prior_near_or_immediate() {
        let mut tracker = DirectionalStateTracker::new();
        tracker.record(1, Near);
        assert!(tracker.moving_away_from(1, Far));
        assert!(!tracker.moving_away_from(1, Unknown));

        tracker.record(1, Immediate);
        assert!(tracker.moving_away_from(1, Far));

        tracker.record(1, Far);
        assert!(!tracker.moving_away_from(1, Far));
    }

    #[test]
    fn test_record_replaces_single_observation() {
        let mut tracker = DirectionalStateTracker::new();
        tracker.record(1, Near);
        tracker.record(1, Far);
        tracker.record(2, Immediate);
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.last_proximity(1), Some(Far));

        tracker.clear();
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_observations_are_per_beacon() {
        let mut tracker = DirectionalStateTracker::new();
        tracker.record(1, Near);
        assert!(!tracker.moving_towards(2, Near));
    }
}
