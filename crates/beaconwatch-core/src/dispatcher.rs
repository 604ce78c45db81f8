//! Business-rule matching.
//!
//! Every rule attached to a beacon is checked on its own; one signal can
//! match none, one or several rules, and there is no early exit.
//!
//! | rule type          | matches when                                   |
//! |--------------------|------------------------------------------------|
//! | `far`              | proximity is `far`                             |
//! | `close`            | proximity is `near`                            |
//! | `immediate`        | proximity is `immediate`                       |
//! | `moving_towards`   | [`DirectionalStateTracker::moving_towards`]    |
//! | `moving_away_from` | [`DirectionalStateTracker::moving_away_from`]  |

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::notify::BusinessRuleMatched;
use crate::repository::BusinessRuleRepository;
use crate::tracker::DirectionalStateTracker;
use crate::types::{BusinessRule, BusinessRuleType, KnownBeacon, Proximity, Signal};

/// Evaluates a beacon's business rules against a signal.
#[derive(Clone)]
pub struct BusinessRuleDispatcher {
    rules: Arc<dyn BusinessRuleRepository>,
}

impl std::fmt::Debug for BusinessRuleDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusinessRuleDispatcher").finish_non_exhaustive()
    }
}

impl BusinessRuleDispatcher {
    /// Create a dispatcher reading rules from `rules`.
    #[must_use]
    pub fn new(rules: Arc<dyn BusinessRuleRepository>) -> Self {
        Self { rules }
    }

    /// Every rule of `known_beacon` that `signal` matches, given the prior
    /// directional state in `tracker`. The tracker is only read.
    #[must_use]
    pub fn evaluate(
        &self,
        signal: &Signal,
        known_beacon: &KnownBeacon,
        tracker: &DirectionalStateTracker,
    ) -> Vec<BusinessRuleMatched> {
        let matched_at = Utc::now();
        self.rules
            .get_business_rules(known_beacon.beacon_id)
            .into_iter()
            .filter(|rule| rule_matches(rule, signal, known_beacon, tracker))
            .inspect(|rule| {
                debug!(
                    beacon_id = known_beacon.beacon_id,
                    rule_id = rule.id,
                    rule_type = ?rule.rule_type,
                    "business rule matched"
                );
            })
            .map(|business_rule| BusinessRuleMatched {
                signal: signal.clone(),
                business_rule,
                known_beacon: known_beacon.clone(),
                matched_at,
            })
            .collect()
    }
}

fn rule_matches(
    rule: &BusinessRule,
    signal: &Signal,
    known_beacon: &KnownBeacon,
    tracker: &DirectionalStateTracker,
) -> bool {
    let beacon_id = known_beacon.beacon_id;
    match rule.rule_type {
        BusinessRuleType::Far => signal.proximity == Proximity::Far,
        BusinessRuleType::Close => signal.proximity == Proximity::Near,
        BusinessRuleType::Immediate => signal.proximity == Proximity::Immediate,
        BusinessRuleType::MovingTowards => tracker.moving_towards(beacon_id, signal.proximity),
        BusinessRuleType::MovingAwayFrom => tracker.moving_away_from(beacon_id, signal.proximity),
        BusinessRuleType::Unsupported => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryReferenceRepository, ReferenceSnapshot};

    fn known_beacon() -> KnownBeacon {
        KnownBeacon {
            id: 1,
            beacon_id: 7,
            network_id: 42,
            title: String::new(),
            description: None,
            uuid: "ABCD".into(),
            major: 1,
            minor: 1,
            latitude: None,
            longitude: None,
            is_geofence: false,
        }
    }

    fn dispatcher(types: &[BusinessRuleType]) -> BusinessRuleDispatcher {
        let repo = InMemoryReferenceRepository::new();
        repo.replace_network(ReferenceSnapshot {
            network_id: 42,
            known_beacons: vec![known_beacon()],
            business_rules: types
                .iter()
                .enumerate()
                .map(|(i, rule_type)| BusinessRule {
                    id: i as u64 + 1,
                    beacon_id: 7,
                    rule_type: *rule_type,
                    interaction_id: None,
                    interaction_type: None,
                    content: None,
                })
                .collect(),
        });
        BusinessRuleDispatcher::new(Arc::new(repo))
    }

    fn signal(proximity: Proximity) -> Signal {
        Signal::new("abcd", 1, 1, -60, proximity)
    }

    #[test]
    fn test_static_rules() {
        let d = dispatcher(&[
            BusinessRuleType::Far,
            BusinessRuleType::Close,
            BusinessRuleType::Immediate,
        ]);
        let tracker = DirectionalStateTracker::new();
        let beacon = known_beacon();

        let matched = d.evaluate(&signal(Proximity::Near), &beacon, &tracker);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].business_rule.rule_type, BusinessRuleType::Close);

        assert!(d
            .evaluate(&signal(Proximity::Unknown), &beacon, &tracker)
            .is_empty());
    }

    #[test]
    fn test_all_matching_rules_fire() {
        let d = dispatcher(&[
            BusinessRuleType::Close,
            BusinessRuleType::Close,
            BusinessRuleType::MovingTowards,
        ]);
        let mut tracker = DirectionalStateTracker::new();
        tracker.record(7, Proximity::Near);

        let matched = d.evaluate(&signal(Proximity::Near), &known_beacon(), &tracker);
        assert_eq!(matched.len(), 3);
    }

    #[test]
    fn test_directional_rules_read_prior_state() {
        let d = dispatcher(&[BusinessRuleType::MovingAwayFrom]);
        let mut tracker = DirectionalStateTracker::new();
        let beacon = known_beacon();

        assert!(d.evaluate(&signal(Proximity::Far), &beacon, &tracker).is_empty());
        tracker.record(7, Proximity::Immediate);
        assert_eq!(d.evaluate(&signal(Proximity::Far), &beacon, &tracker).len(), 1);
    }

    #[test]
    fn test_unsupported_rule_never_matches() {
        let d = dispatcher(&[BusinessRuleType::Unsupported]);
        let tracker = DirectionalStateTracker::new();
        for p in [Proximity::Far, Proximity::Near, Proximity::Immediate] {
            assert!(d.evaluate(&signal(p), &known_beacon(), &tracker).is_empty());
        }
    }
}
