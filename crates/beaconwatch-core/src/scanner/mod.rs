//! Scanner lifecycle over interchangeable scanning backends.
//!
//! A [`ScanBackend`] is one native scanning stack (BlueZ, a vendor SDK, the
//! [`mock`] backend in tests). The [`Scanner`] drives any of them through
//! the same lifecycle:
//!
//! ```text
//! uninitialized --init--> binding --start_scanning--> scanning <--> backgrounded
//!        \                   \                           |              |
//!         +-------------------+------- stop_scanning ----+--------------+--> stopped
//! ```
//!
//! `stopped` is terminal; a new [`Scanner`] is needed to scan again. The
//! host owns a [`ScannerSlot`], which holds at most one active scanner and
//! refuses a second start until the first is stopped. Scanners built by one
//! slot share its backend, so the slot also runs their start sequences one
//! at a time: a start that was cancelled by a stop finishes releasing what it
//! bound before the next scanner touches the backend.
//!
//! Every asynchronous step (permission prompt, service bind, reference
//! refresh, monitor request) captures the scanner's generation before it
//! suspends and re-checks it afterwards. [`Scanner::stop_scanning`] bumps the
//! generation, so a step that completes after a stop never resumes scanning.

pub mod mock;

#[cfg(feature = "bluetooth")]
pub mod bluez;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::dispatcher::BusinessRuleDispatcher;
use crate::error::{BeaconError, Result};
use crate::geofence::{GeofenceMonitor, GeofenceRegion, DEFAULT_RADIUS_M};
use crate::handler::ProximityEventHandler;
use crate::mapper::{monitoring_descriptor, RawBeaconEvent};
use crate::notify::NotificationBus;
use crate::region::{MonitoredRegion, MonitoringDescriptor, RegionRegistry};
use crate::repository::{AuditLog, BusinessRuleRepository, KnownBeaconRepository, ReferenceRefresher};
use crate::types::{NetworkId, ScanStatus};

// ============================================================================
// Lifecycle state
// ============================================================================

/// Lifecycle state of a [`Scanner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScannerState {
    /// Constructed; `init` has not succeeded yet.
    Uninitialized,
    /// Initialized for a network, waiting for the backend service.
    Binding,
    /// Monitoring and ranging in the foreground profile.
    Scanning,
    /// Monitoring and ranging in the low-power profile.
    Backgrounded,
    /// Stopped. Terminal.
    Stopped,
}

impl ScannerState {
    /// The lowercase state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Binding => "binding",
            Self::Scanning => "scanning",
            Self::Backgrounded => "backgrounded",
            Self::Stopped => "stopped",
        }
    }

    /// Whether the scanner is monitoring (foreground or background).
    #[must_use]
    pub const fn is_scanning(self) -> bool {
        matches!(self, Self::Scanning | Self::Backgrounded)
    }
}

impl fmt::Display for ScannerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Behaviour profiles
// ============================================================================

/// Scan and pause windows of a behaviour profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ScanPeriods {
    /// Foreground scan window in milliseconds.
    pub foreground_scan_ms: u64,
    /// Pause between foreground scans in milliseconds.
    pub foreground_between_scan_ms: u64,
    /// Background scan window in milliseconds.
    pub background_scan_ms: u64,
    /// Pause between background scans in milliseconds.
    pub background_between_scan_ms: u64,
}

impl ScanPeriods {
    /// The scan window for the given mode.
    #[must_use]
    pub const fn scan_window(&self, background: bool) -> Duration {
        Duration::from_millis(if background {
            self.background_scan_ms
        } else {
            self.foreground_scan_ms
        })
    }

    /// The full cycle (window plus pause) for the given mode.
    #[must_use]
    pub const fn cycle(&self, background: bool) -> Duration {
        Duration::from_millis(if background {
            self.background_scan_ms + self.background_between_scan_ms
        } else {
            self.foreground_scan_ms + self.foreground_between_scan_ms
        })
    }
}

/// Named scan aggressiveness profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScanBehavior {
    /// Battery-friendly; long background pauses.
    #[default]
    Proactive,
    /// Short background pauses for faster detection.
    Aggressive,
}

impl ScanBehavior {
    /// The scan periods of this profile.
    #[must_use]
    pub const fn periods(self) -> ScanPeriods {
        match self {
            Self::Proactive => ScanPeriods {
                foreground_scan_ms: 1101,
                foreground_between_scan_ms: 0,
                background_scan_ms: 5001,
                background_between_scan_ms: 60001,
            },
            Self::Aggressive => ScanPeriods {
                foreground_scan_ms: 1001,
                foreground_between_scan_ms: 0,
                background_scan_ms: 2001,
                background_between_scan_ms: 5001,
            },
        }
    }
}

impl FromStr for ScanBehavior {
    type Err = BeaconError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proactive" => Ok(Self::Proactive),
            "aggressive" => Ok(Self::Aggressive),
            _ => Err(BeaconError::UnknownBehavior(s.to_string())),
        }
    }
}

// ============================================================================
// Backend contract
// ============================================================================

/// Which backend implementation to construct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Linux BlueZ via D-Bus.
    #[default]
    Bluez,
    /// Scriptable in-process backend.
    Mock,
}

impl BackendKind {
    /// Construct the backend.
    ///
    /// # Errors
    ///
    /// Returns [`BeaconError::BackendUnavailable`] if the backend was not
    /// compiled into this build.
    pub fn create_backend(self) -> Result<Arc<dyn ScanBackend>> {
        match self {
            Self::Mock => Ok(Arc::new(mock::MockBackend::new())),
            #[cfg(feature = "bluetooth")]
            Self::Bluez => Ok(Arc::new(bluez::BluezBackend::new())),
            #[cfg(not(feature = "bluetooth"))]
            Self::Bluez => Err(BeaconError::BackendUnavailable("bluez".into())),
        }
    }
}

/// Capabilities one native scanning stack provides.
///
/// Raw detections leave the backend as [`RawBeaconEvent`]s on the channel
/// handed to [`add_listeners`](Self::add_listeners); the vendor mappers turn
/// them into signals downstream.
#[async_trait]
pub trait ScanBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Whether the radio can do Bluetooth Low Energy at all.
    async fn is_ble_supported(&self) -> bool;

    /// Whether the radio is switched on.
    async fn is_ble_enabled(&self) -> bool;

    /// Whether the platform needs an explicit runtime location grant.
    fn requires_permission(&self) -> bool {
        false
    }

    /// Ask for the runtime location grant. Resolves to `true` when granted.
    async fn request_permission(&self) -> bool {
        true
    }

    /// Bind the native scanning service.
    async fn bind(&self) -> Result<()>;

    /// Whether a service binding is held.
    fn is_bound(&self) -> bool;

    /// Release the service binding.
    async fn unbind(&self);

    /// Start monitoring one region.
    async fn start_monitoring(&self, region: &MonitoringDescriptor) -> Result<()>;

    /// Stop monitoring every region.
    async fn stop_monitoring_all(&self);

    /// Deliver raw detections to `events`.
    fn add_listeners(&self, events: mpsc::Sender<RawBeaconEvent>);

    /// Stop delivering raw detections.
    fn remove_listeners(&self);

    /// Whether [`set_background_mode`](Self::set_background_mode) does anything.
    fn supports_background_mode(&self) -> bool {
        false
    }

    /// Switch between the foreground and the low-power profile.
    async fn set_background_mode(&self, _background: bool) -> Result<()> {
        Ok(())
    }

    /// Whether scan periods can be tuned.
    fn supports_behavior(&self) -> bool {
        false
    }

    /// Apply scan periods.
    fn set_scan_periods(&self, _periods: ScanPeriods) {}
}

// ============================================================================
// Scanner
// ============================================================================

/// The external collaborators a scanner works with.
#[derive(Clone)]
pub struct Collaborators {
    /// Known-beacon lookup.
    pub known_beacons: Arc<dyn KnownBeaconRepository>,
    /// Business-rule lookup.
    pub business_rules: Arc<dyn BusinessRuleRepository>,
    /// Audit sink.
    pub audit: Arc<dyn AuditLog>,
    /// Reference-data refresh run before scanning starts.
    pub refresher: Option<Arc<dyn ReferenceRefresher>>,
    /// Monitor for geofence-only beacons.
    pub geofence: Option<Arc<dyn GeofenceMonitor>>,
    /// Where notifications go.
    pub bus: NotificationBus,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("refresher", &self.refresher.is_some())
            .field("geofence", &self.geofence.is_some())
            .finish_non_exhaustive()
    }
}

/// Construction-time scanner options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScannerOptions {
    /// The process was woken by a geofence event; skip the reference refresh.
    pub launched_by_geofence: bool,
    /// Radius of geofence regions in meters.
    pub geofence_radius_m: f64,
    /// Capacity of the raw event channel.
    pub event_buffer: usize,
}

impl Default for ScannerOptions {
    fn default() -> Self {
        Self {
            launched_by_geofence: false,
            geofence_radius_m: DEFAULT_RADIUS_M,
            event_buffer: 256,
        }
    }
}

#[derive(Debug)]
struct ScannerInner {
    state: ScannerState,
    network_id: Option<NetworkId>,
    registry: RegionRegistry,
    pump: Option<JoinHandle<()>>,
}

/// One scanning session over a backend.
pub struct Scanner {
    backend: Arc<dyn ScanBackend>,
    collaborators: Collaborators,
    options: ScannerOptions,
    inner: Mutex<ScannerInner>,
    handler: Arc<Mutex<ProximityEventHandler>>,
    generation: AtomicU64,
}

impl fmt::Debug for Scanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scanner")
            .field("backend", &self.backend.name())
            .field("state", &self.state())
            .field("network_id", &self.network_id())
            .finish_non_exhaustive()
    }
}

impl Scanner {
    /// Create an uninitialized scanner.
    #[must_use]
    pub fn new(
        backend: Arc<dyn ScanBackend>,
        collaborators: Collaborators,
        options: ScannerOptions,
    ) -> Self {
        let handler = ProximityEventHandler::new(
            Arc::clone(&collaborators.known_beacons),
            Arc::clone(&collaborators.audit),
            BusinessRuleDispatcher::new(Arc::clone(&collaborators.business_rules)),
            collaborators.bus.clone(),
        );
        Self {
            backend,
            collaborators,
            options,
            inner: Mutex::new(ScannerInner {
                state: ScannerState::Uninitialized,
                network_id: None,
                registry: RegionRegistry::new(),
                pump: None,
            }),
            handler: Arc::new(Mutex::new(handler)),
            generation: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScannerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn epoch(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == epoch
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ScannerState {
        self.lock().state
    }

    /// The network this scanner was initialized for.
    #[must_use]
    pub fn network_id(&self) -> Option<NetworkId> {
        self.lock().network_id
    }

    /// Regions with a live monitor request.
    #[must_use]
    pub fn monitored_regions(&self) -> Vec<MonitoredRegion> {
        self.lock().registry.regions().to_vec()
    }

    /// Name of the backend in use.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Whether the radio supports BLE.
    pub async fn is_ble_supported(&self) -> bool {
        self.backend.is_ble_supported().await
    }

    /// Whether the radio is switched on.
    pub async fn is_ble_enabled(&self) -> bool {
        self.backend.is_ble_enabled().await
    }

    /// Prepare the scanner for a network.
    ///
    /// Requests the runtime permission first when the backend needs one. On
    /// success the scanner is `binding` with empty directional state and no
    /// monitored regions.
    ///
    /// # Errors
    ///
    /// - [`BeaconError::MissingNetworkId`] without a network id; nothing changes.
    /// - [`BeaconError::PermissionDenied`] if the grant was refused; the
    ///   scanner stays `uninitialized`.
    /// - [`BeaconError::Cancelled`] if the scanner was stopped during the prompt.
    /// - [`BeaconError::InvalidState`] if the scanner is not `uninitialized`.
    pub async fn init(&self, network_id: Option<NetworkId>) -> Result<()> {
        let Some(network_id) = network_id else {
            warn!("network id is undefined, scanner not initialized");
            return Err(BeaconError::MissingNetworkId);
        };
        self.require_state("init", |s| s == ScannerState::Uninitialized)?;

        let epoch = self.epoch();
        if self.backend.requires_permission() {
            let granted = self.backend.request_permission().await;
            if !self.is_current(epoch) {
                debug!(network_id, "permission answer arrived after stop, ignoring");
                return Err(BeaconError::Cancelled("permission request"));
            }
            if !granted {
                warn!(network_id, "location permission denied, scanner not initialized");
                return Err(BeaconError::PermissionDenied);
            }
        }

        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
        let mut inner = self.lock();
        inner.registry.clear();
        inner.network_id = Some(network_id);
        inner.state = ScannerState::Binding;
        drop(inner);

        debug!(network_id, backend = self.backend.name(), "scanner initialized");
        Ok(())
    }

    fn require_state(
        &self,
        operation: &'static str,
        allowed: impl Fn(ScannerState) -> bool,
    ) -> Result<()> {
        let state = self.state();
        if allowed(state) {
            Ok(())
        } else {
            Err(BeaconError::InvalidState { operation, state })
        }
    }

    /// Bind the backend, register every known beacon of the network and start
    /// listening.
    ///
    /// Unless the process was launched by a geofence event, the network's
    /// reference data is refreshed first; a failed refresh is logged and the
    /// committed data is used. Beacon-style entries are monitored once per
    /// UUID; geofence-only entries go to the geofence monitor, whose previous
    /// regions are cleared first.
    ///
    /// # Errors
    ///
    /// - [`BeaconError::BindFailed`] if the backend could not bind; the scanner
    ///   is stopped and every resource released.
    /// - [`BeaconError::Cancelled`] if the scanner was stopped meanwhile.
    /// - [`BeaconError::InvalidState`] unless the scanner is `binding`.
    pub async fn start_scanning(&self) -> Result<()> {
        self.require_state("start_scanning", |s| s == ScannerState::Binding)?;
        let network_id = self.network_id().ok_or(BeaconError::MissingNetworkId)?;
        let epoch = self.epoch();

        if let Err(e) = self.backend.bind().await {
            warn!(network_id, backend = self.backend.name(), error = %e, "failed to bind scanning service");
            self.stop_scanning().await;
            return Err(match e {
                BeaconError::BindFailed(_) => e,
                other => BeaconError::BindFailed(other.to_string()),
            });
        }
        if !self.is_current(epoch) {
            debug!(network_id, "service bound after stop, releasing");
            self.backend.unbind().await;
            return Err(BeaconError::Cancelled("bind"));
        }

        if !self.options.launched_by_geofence {
            if let Some(refresher) = &self.collaborators.refresher {
                if let Err(e) = refresher.refresh(network_id).await {
                    warn!(network_id, error = %e, "reference refresh failed, using committed data");
                }
                if !self.is_current(epoch) {
                    return Err(BeaconError::Cancelled("reference refresh"));
                }
            }
        }

        let (geofences, beacons): (Vec<_>, Vec<_>) = self
            .collaborators
            .known_beacons
            .get_known_beacons(network_id)
            .into_iter()
            .partition(|beacon| beacon.is_geofence);

        for beacon in &beacons {
            if beacon.uuid.trim().is_empty() {
                debug!(beacon_id = beacon.beacon_id, "known beacon without UUID, skipping");
                continue;
            }
            let descriptor = monitoring_descriptor(beacon);
            if self.lock().registry.is_monitoring(&descriptor.region.uuid) {
                continue;
            }
            let result = self.backend.start_monitoring(&descriptor).await;
            if !self.is_current(epoch) {
                debug!(uuid = %descriptor.region.uuid, "region monitored after stop, releasing");
                self.backend.stop_monitoring_all().await;
                return Err(BeaconError::Cancelled("start monitoring"));
            }
            match result {
                Ok(()) => {
                    self.lock().registry.insert(descriptor.region);
                }
                Err(e) => {
                    warn!(uuid = %descriptor.region.uuid, error = %e, "failed to monitor region");
                }
            }
        }

        self.add_all_event_listeners();

        if let Some(monitor) = &self.collaborators.geofence {
            monitor.stop_monitoring();
            for beacon in &geofences {
                match GeofenceRegion::from_known_beacon(beacon, self.options.geofence_radius_m) {
                    Some(region) => monitor.start_monitoring(region),
                    None => {
                        warn!(beacon_id = beacon.beacon_id, "geofence beacon has no location, skipping");
                    }
                }
            }
        }

        let mut inner = self.lock();
        if !self.is_current(epoch) {
            return Err(BeaconError::Cancelled("start scanning"));
        }
        inner.state = ScannerState::Scanning;
        let regions = inner.registry.len();
        drop(inner);

        info!(
            network_id,
            backend = self.backend.name(),
            regions,
            geofences = geofences.len(),
            "scanning started"
        );
        Ok(())
    }

    /// Route backend and geofence events into the handler. Idempotent.
    pub fn add_all_event_listeners(&self) {
        let mut inner = self.lock();
        if inner.pump.is_some() || inner.state == ScannerState::Stopped {
            return;
        }

        let (tx, mut rx) = mpsc::channel(self.options.event_buffer.max(1));
        self.backend.add_listeners(tx.clone());
        if let Some(monitor) = &self.collaborators.geofence {
            monitor.attach(tx);
        }

        let handler = Arc::clone(&self.handler);
        inner.pump = Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handler
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .handle_event(&event);
            }
        }));
    }

    /// Undo [`add_all_event_listeners`](Self::add_all_event_listeners). Idempotent.
    pub fn remove_all_event_listeners(&self) {
        let Some(pump) = self.lock().pump.take() else {
            return;
        };
        self.backend.remove_listeners();
        if let Some(monitor) = &self.collaborators.geofence {
            monitor.detach();
        }
        pump.abort();
    }

    /// Stop scanning and release everything, whatever the current state.
    ///
    /// Removes the listeners, stops every monitored region, releases the
    /// service binding and clears the region registry. Calling it again is a
    /// no-op.
    pub async fn stop_scanning(&self) {
        {
            let mut inner = self.lock();
            if inner.state == ScannerState::Stopped {
                debug!("scanner already stopped");
                return;
            }
            inner.state = ScannerState::Stopped;
            self.generation.fetch_add(1, Ordering::SeqCst);
        }

        self.remove_all_event_listeners();
        self.backend.stop_monitoring_all().await;
        if self.backend.is_bound() {
            self.backend.unbind().await;
        }
        if let Some(monitor) = &self.collaborators.geofence {
            monitor.stop_monitoring();
        }
        self.lock().registry.clear();

        info!(network_id = ?self.network_id(), backend = self.backend.name(), "scanning stopped");
    }

    /// Switch between the foreground and the low-power scan profile.
    ///
    /// Returns `false` with a warning when the backend has no background
    /// mode, the scanner is not scanning, or the backend refused.
    pub async fn set_background_mode(&self, background: bool) -> bool {
        if !self.backend.supports_background_mode() {
            warn!(backend = self.backend.name(), "background mode is not supported by this backend");
            return false;
        }
        let state = self.state();
        if !state.is_scanning() {
            warn!(%state, "background mode can only be changed while scanning");
            return false;
        }

        let epoch = self.epoch();
        if let Err(e) = self.backend.set_background_mode(background).await {
            warn!(error = %e, "failed to change background mode");
            return false;
        }

        let mut inner = self.lock();
        if !self.is_current(epoch) {
            return false;
        }
        inner.state = if background {
            ScannerState::Backgrounded
        } else {
            ScannerState::Scanning
        };
        drop(inner);
        debug!(background, "background mode changed");
        true
    }

    /// Apply a scan behaviour profile. Returns `false` with a warning when the
    /// backend cannot tune its scan periods.
    pub fn set_behavior(&self, behavior: ScanBehavior) -> bool {
        if !self.backend.supports_behavior() {
            warn!(backend = self.backend.name(), ?behavior, "scan behavior is not supported by this backend");
            return false;
        }
        self.backend.set_scan_periods(behavior.periods());
        info!(?behavior, "scan behavior applied");
        true
    }

    /// Apply a scan behaviour profile by name. Unknown names are rejected with
    /// a warning and nothing changes.
    pub fn set_behavior_named(&self, name: &str) -> bool {
        match name.parse::<ScanBehavior>() {
            Ok(behavior) => self.set_behavior(behavior),
            Err(e) => {
                warn!(error = %e, "ignoring scan behavior");
                false
            }
        }
    }
}

// ============================================================================
// Active-scanner slot
// ============================================================================

/// Parameters of a start request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StartRequest {
    /// Network to scan for.
    pub network_id: Option<NetworkId>,
    /// Behaviour profile to apply, if any.
    pub behavior: Option<ScanBehavior>,
}

/// Holds the one active [`Scanner`] of the host and builds new ones.
pub struct ScannerSlot {
    backend: Arc<dyn ScanBackend>,
    collaborators: Collaborators,
    options: ScannerOptions,
    active: Mutex<Option<Arc<Scanner>>>,
    // Held for a whole start sequence, including one a stop has cancelled.
    starting: AsyncMutex<()>,
}

impl fmt::Debug for ScannerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScannerSlot")
            .field("backend", &self.backend.name())
            .field("active", &self.active())
            .finish_non_exhaustive()
    }
}

impl ScannerSlot {
    /// Create an empty slot building scanners over `backend`.
    #[must_use]
    pub fn new(
        backend: Arc<dyn ScanBackend>,
        collaborators: Collaborators,
        options: ScannerOptions,
    ) -> Self {
        Self {
            backend,
            collaborators,
            options,
            active: Mutex::new(None),
            starting: AsyncMutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<Scanner>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The active scanner, if any.
    #[must_use]
    pub fn active(&self) -> Option<Arc<Scanner>> {
        self.lock().clone()
    }

    /// Whether a scanner is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    /// Whether the radio supports BLE.
    pub async fn is_ble_supported(&self) -> bool {
        self.backend.is_ble_supported().await
    }

    /// Whether the radio is switched on.
    pub async fn is_ble_enabled(&self) -> bool {
        self.backend.is_ble_enabled().await
    }

    /// Build, initialize and start a scanner.
    ///
    /// Refused while another scanner is active; that scanner is left
    /// untouched and no native call is made. A scanner whose start fails is
    /// stopped and does not occupy the slot.
    ///
    /// When a stopped scanner's start is still waiting on the backend, this
    /// waits for it to unwind before building the new scanner.
    pub async fn start(&self, request: StartRequest) -> ScanStatus {
        if self.is_active() {
            warn!("a scanner is already active, stop it before starting another");
            return ScanStatus::failed("Scanner already started; stop it first");
        }
        if let Err(e) = self.check_radio().await {
            warn!(backend = self.backend.name(), error = %e, "radio not ready");
            return ScanStatus::failed(e.to_string());
        }

        let _starting = self.starting.lock().await;
        let scanner = Arc::new(Scanner::new(
            Arc::clone(&self.backend),
            self.collaborators.clone(),
            self.options,
        ));
        {
            let mut active = self.lock();
            if active.is_some() {
                warn!("a scanner is already active, stop it before starting another");
                return ScanStatus::failed("Scanner already started; stop it first");
            }
            *active = Some(Arc::clone(&scanner));
        }

        match Self::run(&scanner, request).await {
            Ok(()) => ScanStatus::ok("Scanning started"),
            Err(e) => {
                if scanner.state() != ScannerState::Uninitialized {
                    scanner.stop_scanning().await;
                }
                self.release(&scanner);
                warn!(error = %e, "scanner did not start");
                ScanStatus::failed(e.to_string())
            }
        }
    }

    async fn check_radio(&self) -> Result<()> {
        if !self.backend.is_ble_supported().await {
            return Err(BeaconError::BleUnsupported);
        }
        if !self.backend.is_ble_enabled().await {
            return Err(BeaconError::BleDisabled);
        }
        Ok(())
    }

    async fn run(scanner: &Scanner, request: StartRequest) -> Result<()> {
        scanner.init(request.network_id).await?;
        if let Some(behavior) = request.behavior {
            scanner.set_behavior(behavior);
        }
        scanner.start_scanning().await
    }

    fn release(&self, scanner: &Arc<Scanner>) {
        let mut active = self.lock();
        if active.as_ref().is_some_and(|a| Arc::ptr_eq(a, scanner)) {
            *active = None;
        }
    }

    /// Stop and drop the active scanner. Succeeds when nothing is active.
    pub async fn stop(&self) -> ScanStatus {
        let Some(scanner) = self.lock().take() else {
            debug!("stop requested without an active scanner");
            return ScanStatus::ok("No active scanner");
        };
        scanner.stop_scanning().await;
        ScanStatus::ok("Scanning stopped")
    }

    /// Move the active scanner to the low-power profile.
    pub async fn pause(&self) -> ScanStatus {
        self.background(true).await
    }

    /// Move the active scanner back to the foreground profile.
    pub async fn resume(&self) -> ScanStatus {
        self.background(false).await
    }

    async fn background(&self, background: bool) -> ScanStatus {
        let Some(scanner) = self.active() else {
            warn!(background, "no active scanner to change background mode on");
            return ScanStatus::failed("No active scanner");
        };
        if scanner.set_background_mode(background).await {
            ScanStatus::ok(if background {
                "Scanner paused"
            } else {
                "Scanner resumed"
            })
        } else {
            ScanStatus::failed("Background mode could not be changed")
        }
    }

    /// Apply a behaviour profile to the active scanner.
    pub fn set_behavior(&self, behavior: ScanBehavior) -> ScanStatus {
        match self.active() {
            Some(scanner) if scanner.set_behavior(behavior) => ScanStatus::ok("Scan behavior applied"),
            Some(_) => ScanStatus::failed("Scan behavior is not supported by this backend"),
            None => {
                warn!("no active scanner to apply a behavior to");
                ScanStatus::failed("No active scanner")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_behavior_periods() {
        let proactive = ScanBehavior::Proactive.periods();
        assert_eq!(proactive.foreground_scan_ms, 1101);
        assert_eq!(proactive.background_between_scan_ms, 60001);

        let aggressive = ScanBehavior::Aggressive.periods();
        assert_eq!(aggressive.background_scan_ms, 2001);
        assert_eq!(aggressive.cycle(true), Duration::from_millis(7002));
        assert_eq!(aggressive.scan_window(false), Duration::from_millis(1001));
    }

    #[test]
    fn test_behavior_parsing() {
        assert_eq!("Aggressive".parse::<ScanBehavior>().unwrap(), ScanBehavior::Aggressive);
        let err = "lazy".parse::<ScanBehavior>().unwrap_err();
        assert!(matches!(err, BeaconError::UnknownBehavior(_)));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ScannerState::Backgrounded.to_string(), "backgrounded");
        assert!(ScannerState::Backgrounded.is_scanning());
        assert!(!ScannerState::Binding.is_scanning());
    }

    #[test]
    fn test_mock_backend_is_always_available() {
        assert_eq!(BackendKind::Mock.create_backend().unwrap().name(), "mock");
    }
}
