//! Per-signal processing.
//!
//! [`ProximityEventHandler::handle`] runs one signal to completion:
//!
//! 1. a zero or missing RSSI is an out-of-range artifact and is dropped
//!    without a trace;
//! 2. the signal is audited and resolved against the known beacons;
//! 3. a [`BeaconObserved`] notification is published, resolved or not;
//! 4. for a resolved beacon, the dispatcher evaluates its rules against the
//!    *prior* directional state, every match is published, and only then is
//!    the tracker updated with the new proximity.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, trace};

use crate::dispatcher::BusinessRuleDispatcher;
use crate::mapper::RawBeaconEvent;
use crate::notify::{BeaconObserved, Notification, NotificationBus};
use crate::repository::{AuditLog, KnownBeaconRepository};
use crate::tracker::DirectionalStateTracker;
use crate::types::{BeaconId, Signal};

/// What happened to a handled signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Dropped before any processing (out of range or unmappable).
    Discarded,
    /// Observed, but no known beacon matched.
    Unresolved,
    /// Resolved to a known beacon and evaluated against its rules.
    Resolved {
        /// The resolved beacon id.
        beacon_id: BeaconId,
        /// Number of rules that matched.
        matched_rules: usize,
    },
}

/// Turns signals into notifications. Owns the directional state.
pub struct ProximityEventHandler {
    known_beacons: Arc<dyn KnownBeaconRepository>,
    audit: Arc<dyn AuditLog>,
    dispatcher: BusinessRuleDispatcher,
    tracker: DirectionalStateTracker,
    bus: NotificationBus,
}

impl std::fmt::Debug for ProximityEventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProximityEventHandler")
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl ProximityEventHandler {
    /// Create a handler with empty directional state.
    #[must_use]
    pub fn new(
        known_beacons: Arc<dyn KnownBeaconRepository>,
        audit: Arc<dyn AuditLog>,
        dispatcher: BusinessRuleDispatcher,
        bus: NotificationBus,
    ) -> Self {
        Self {
            known_beacons,
            audit,
            dispatcher,
            tracker: DirectionalStateTracker::new(),
            bus,
        }
    }

    /// Forget all directional state.
    pub fn reset(&mut self) {
        self.tracker.clear();
    }

    /// Current directional state.
    #[must_use]
    pub const fn tracker(&self) -> &DirectionalStateTracker {
        &self.tracker
    }

    /// Map a raw backend event and handle the resulting signal. Events the
    /// mappers reject are discarded.
    pub fn handle_event(&mut self, event: &RawBeaconEvent) -> HandleOutcome {
        match event.to_signal() {
            Ok(signal) => self.handle(signal),
            Err(e) => {
                debug!(error = %e, "discarding unmappable backend event");
                HandleOutcome::Discarded
            }
        }
    }

    /// Process one normalized signal.
    pub fn handle(&mut self, signal: Signal) -> HandleOutcome {
        if signal.is_out_of_range() {
            return HandleOutcome::Discarded;
        }

        self.audit.record(&signal);
        let known_beacon =
            self.known_beacons
                .find_known_beacon(&signal.uuid, signal.major, signal.minor);

        self.bus.publish(Notification::BeaconObserved(BeaconObserved {
            signal: signal.clone(),
            known_beacon: known_beacon.clone(),
            observed_at: Utc::now(),
        }));

        let Some(known_beacon) = known_beacon else {
            trace!(uuid = %signal.uuid, major = signal.major, minor = signal.minor, "unknown beacon");
            return HandleOutcome::Unresolved;
        };

        let matches = self.dispatcher.evaluate(&signal, &known_beacon, &self.tracker);
        let matched_rules = matches.len();
        for matched in matches {
            self.bus.publish(Notification::BusinessRuleMatched(matched));
        }

        self.tracker.record(known_beacon.beacon_id, signal.proximity);
        HandleOutcome::Resolved {
            beacon_id: known_beacon.beacon_id,
            matched_rules,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::{GeofenceEntry, RangedBeacon};
    use crate::repository::{InMemoryAuditLog, InMemoryReferenceRepository, ReferenceSnapshot};
    use crate::types::{BusinessRule, BusinessRuleType, KnownBeacon, Proximity};
    use tokio::sync::broadcast::Receiver;

    struct Fixture {
        handler: ProximityEventHandler,
        audit: Arc<InMemoryAuditLog>,
        rx: Receiver<Notification>,
    }

    fn fixture(rules: &[BusinessRuleType]) -> Fixture {
        let repo = Arc::new(InMemoryReferenceRepository::new());
        repo.replace_network(ReferenceSnapshot {
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
                latitude: None,
                longitude: None,
                is_geofence: false,
            }],
            business_rules: rules
                .iter()
                .zip(1..)
                .map(|(rule_type, id)| BusinessRule {
                    id,
                    beacon_id: 7,
                    rule_type: *rule_type,
                    interaction_id: None,
                    interaction_type: None,
                    content: None,
                })
                .collect(),
        });
        let audit = Arc::new(InMemoryAuditLog::new());
        let bus = NotificationBus::new(64);
        let rx = bus.subscribe();
        let handler = ProximityEventHandler::new(
            repo.clone(),
            audit.clone(),
            BusinessRuleDispatcher::new(repo),
            bus,
        );
        Fixture { handler, audit, rx }
    }

    fn drain(rx: &mut Receiver<Notification>) -> Vec<Notification> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn matched_rule_ids(notifications: &[Notification]) -> Vec<u64> {
        notifications
            .iter()
            .filter_map(|n| match n {
                Notification::BusinessRuleMatched(m) => Some(m.business_rule.id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_zero_rssi_is_silently_discarded() {
        let mut f = fixture(&[BusinessRuleType::Close]);
        let outcome = f
            .handler
            .handle(Signal::new("abcd", 1, 1, 0, Proximity::Near));

        assert_eq!(outcome, HandleOutcome::Discarded);
        assert!(drain(&mut f.rx).is_empty());
        assert!(f.audit.is_empty());
        assert!(f.handler.tracker().is_empty());
    }

    #[test]
    fn test_resolved_signal_matches_close_rule() {
        let mut f = fixture(&[BusinessRuleType::Close]);
        let outcome = f
            .handler
            .handle(Signal::new("abcd", 1, 1, -60, Proximity::Near));

        assert_eq!(
            outcome,
            HandleOutcome::Resolved {
                beacon_id: 7,
                matched_rules: 1
            }
        );
        let notifications = drain(&mut f.rx);
        assert_eq!(notifications.len(), 2);
        match &notifications[0] {
            Notification::BeaconObserved(o) => {
                assert_eq!(o.known_beacon.as_ref().unwrap().beacon_id, 7);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(matched_rule_ids(&notifications), vec![1]);
        assert_eq!(f.audit.len(), 1);
        assert_eq!(f.handler.tracker().last_proximity(7), Some(Proximity::Near));
    }

    #[test]
    fn test_unresolved_signal_is_observed_and_audited() {
        let mut f = fixture(&[BusinessRuleType::Far]);
        let outcome = f
            .handler
            .handle(Signal::new("ffff", 1, 1, -70, Proximity::Far));

        assert_eq!(outcome, HandleOutcome::Unresolved);
        let notifications = drain(&mut f.rx);
        assert_eq!(notifications.len(), 1);
        assert!(matches!(
            &notifications[0],
            Notification::BeaconObserved(o) if o.known_beacon.is_none()
        ));
        assert_eq!(f.audit.len(), 1);
        assert!(f.handler.tracker().is_empty());
    }

    #[test]
    fn test_far_near_near_sequence() {
        let mut f = fixture(&[BusinessRuleType::Far, BusinessRuleType::MovingTowards]);
        let mut per_step = Vec::new();
        for proximity in [Proximity::Far, Proximity::Near, Proximity::Near] {
            f.handler
                .handle(Signal::new("ABCD", 1, 1, -65, proximity));
            per_step.push(matched_rule_ids(&drain(&mut f.rx)));
        }

        assert_eq!(per_step, vec![vec![1], vec![], vec![2]]);
    }

    #[test]
    fn test_tracker_updated_after_evaluation() {
        let mut f = fixture(&[BusinessRuleType::MovingAwayFrom]);
        f.handler
            .handle(Signal::new("ABCD", 1, 1, -50, Proximity::Immediate));
        let outcome = f
            .handler
            .handle(Signal::new("ABCD", 1, 1, -80, Proximity::Far));

        assert_eq!(
            outcome,
            HandleOutcome::Resolved {
                beacon_id: 7,
                matched_rules: 1
            }
        );
        assert_eq!(f.handler.tracker().last_proximity(7), Some(Proximity::Far));
    }

    #[test]
    fn test_reset_clears_directional_state() {
        let mut f = fixture(&[]);
        f.handler
            .handle(Signal::new("ABCD", 1, 1, -50, Proximity::Near));
        f.handler.reset();
        assert!(f.handler.tracker().is_empty());
    }

    #[test]
    fn test_handle_event_maps_before_handling() {
        let mut f = fixture(&[BusinessRuleType::Close]);
        let ranged = RawBeaconEvent::Ranged(RangedBeacon {
            uuid: "abcd".into(),
            major: 1,
            minor: 1,
            rssi: Some(-60),
            accuracy: 1.2,
            proximity: "near".into(),
        });
        assert!(matches!(
            f.handler.handle_event(&ranged),
            HandleOutcome::Resolved { matched_rules: 1, .. }
        ));

        let bad = RawBeaconEvent::GeofenceEntered(GeofenceEntry {
            identifier: "garbage".into(),
        });
        assert_eq!(f.handler.handle_event(&bad), HandleOutcome::Discarded);
    }

    #[test]
    fn test_bad_signal_does_not_block_later_ones() {
        let mut f = fixture(&[BusinessRuleType::Close]);
        f.handler.handle(Signal::new("ABCD", 1, 1, 0, Proximity::Near));
        let outcome = f.handler.handle(Signal::new("ABCD", 1, 1, -60, Proximity::Near));
        assert!(matches!(outcome, HandleOutcome::Resolved { .. }));
    }
}
