//! Typed notifications for the host application.
//!
//! The engine publishes a [`Notification`] for every observed beacon, every
//! matched business rule and every reference-data refresh. Delivery uses a
//! `tokio` broadcast channel: each subscriber gets its own copy, and a
//! subscriber that falls more than `capacity` notifications behind loses the
//! oldest ones instead of slowing the scanner down.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::types::{BusinessRule, KnownBeacon, NetworkId, Signal};

/// Default number of buffered notifications per subscriber.
pub const DEFAULT_CAPACITY: usize = 256;

/// A structurally valid signal was observed.
#[derive(Debug, Clone, Serialize)]
pub struct BeaconObserved {
    /// The normalized signal.
    pub signal: Signal,
    /// The reference record it resolved to, if any.
    pub known_beacon: Option<KnownBeacon>,
    /// When the signal was handled.
    pub observed_at: DateTime<Utc>,
}

/// A business rule matched a signal.
#[derive(Debug, Clone, Serialize)]
pub struct BusinessRuleMatched {
    /// The signal that triggered the rule.
    pub signal: Signal,
    /// The matching rule.
    pub business_rule: BusinessRule,
    /// The beacon the rule belongs to.
    pub known_beacon: KnownBeacon,
    /// When the rule matched.
    pub matched_at: DateTime<Utc>,
}

/// Reference data for a network was replaced.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceDataRefreshed {
    /// The refreshed network.
    pub network_id: NetworkId,
    /// Number of known beacons now committed.
    pub known_beacons: usize,
    /// Number of business rules now committed.
    pub business_rules: usize,
}

/// Everything the engine tells the host application.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// See [`BeaconObserved`].
    BeaconObserved(BeaconObserved),
    /// See [`BusinessRuleMatched`].
    BusinessRuleMatched(BusinessRuleMatched),
    /// See [`ReferenceDataRefreshed`].
    ReferenceDataRefreshed(ReferenceDataRefreshed),
}

impl Notification {
    /// Short name of the notification kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BeaconObserved(_) => "beacon_observed",
            Self::BusinessRuleMatched(_) => "business_rule_matched",
            Self::ReferenceDataRefreshed(_) => "reference_data_refreshed",
        }
    }
}

/// Publish/subscribe hub for [`Notification`]s.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<Notification>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NotificationBus {
    /// Create a bus buffering up to `capacity` notifications per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Register a new subscriber. It receives notifications published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Publish a notification. Returns the number of subscribers reached;
    /// publishing with nobody listening is not an error.
    pub fn publish(&self, notification: Notification) -> usize {
        let kind = notification.kind();
        let delivered = self.tx.send(notification).unwrap_or(0);
        trace!(kind, delivered, "notification published");
        delivered
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
