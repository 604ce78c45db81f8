//! # beaconwatch-core
//!
//! Core engine of the beaconwatch proximity system: it turns beacon
//! detections from any scanning backend into business-rule notifications.
//!
//! This crate provides:
//! - A scanner lifecycle that drives interchangeable native backends
//! - Region-monitoring deduplication
//! - Per-beacon directional state (moving towards / moving away)
//! - Business-rule matching and typed notifications
//! - Reference-data storage, configuration and audit batching
//!
//! ## Architecture
//!
//! A detection flows through the crate as follows:
//!
//! ```text
//! backend event -> mapper -> handler -> tracker/dispatcher -> notify
//! ```
//!
//! - [`scanner`] - Scanner lifecycle, the active-scanner slot and backends
//! - [`mapper`] - Vendor event and region mappers
//! - [`handler`] - Per-signal resolution, audit and rule evaluation
//! - [`tracker`] - Last observed proximity per beacon
//! - [`dispatcher`] - Business-rule matching
//! - [`region`] - Monitored-region bookkeeping
//! - [`geofence`] - Geofence collaborator for location-only beacons
//! - [`notify`] - Typed notification bus
//! - [`repository`] - Reference-data and audit collaborators
//! - [`storage`] - Reference-data snapshots on disk
//! - [`config`] - Application configuration loading, saving, and validation
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared types and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod geofence;
pub mod handler;
pub mod mapper;
pub mod notify;
pub mod region;
pub mod repository;
pub mod scanner;
pub mod storage;
pub mod tracker;
pub mod types;

// Re-export primary types for convenience
pub use config::{default_config_path, Config, ConfigError, ConfigResult};
pub use dispatcher::BusinessRuleDispatcher;
pub use error::{BeaconError, Result};
pub use geofence::{GeofenceMonitor, GeofenceRegion, InMemoryGeofenceMonitor};
pub use handler::{HandleOutcome, ProximityEventHandler};
pub use mapper::{MapError, RawBeaconEvent, SignalMapper};
pub use notify::{Notification, NotificationBus};
pub use region::{MonitoredRegion, RegionDescriptor, RegionRegistry};
pub use repository::{
    AuditLog, BeaconLogBatch, BusinessRuleRepository, DeviceInfo, InMemoryAuditLog,
    InMemoryReferenceRepository, KnownBeaconRepository, ReferenceRefresher, ReferenceSnapshot,
    StorageRefresher,
};
pub use scanner::mock::MockBackend;
pub use scanner::{
    BackendKind, Collaborators, ScanBackend, ScanBehavior, Scanner, ScannerOptions, ScannerSlot,
    ScannerState, StartRequest,
};
pub use storage::{default_data_dir, Storage};
pub use tracker::DirectionalStateTracker;
pub use types::{
    BeaconId, BusinessRule, BusinessRuleType, KnownBeacon, NetworkId, Proximity, ScanStatus,
    Signal,
};
