//! Scriptable in-process backend.
//!
//! [`MockBackend`] records every call the scanner makes, and lets a test (or
//! a host without a radio) inject raw events with [`MockBackend::emit`]. It
//! models a backend with a native service binding, a runtime permission
//! prompt, background mode, behaviour profiles and region-state driven
//! ranging.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tracing::debug;

use super::{ScanBackend, ScanPeriods};
use crate::error::{BeaconError, Result};
use crate::mapper::RawBeaconEvent;
use crate::region::MonitoringDescriptor;

/// One call the scanner made on the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    /// `request_permission`
    RequestPermission,
    /// `bind`
    Bind,
    /// `unbind`
    Unbind,
    /// `start_monitoring` with the region UUID.
    StartMonitoring(String),
    /// `stop_monitoring_all`
    StopMonitoringAll,
    /// `add_listeners`
    AddListeners,
    /// `remove_listeners`
    RemoveListeners,
    /// `set_background_mode`
    SetBackgroundMode(bool),
    /// `set_scan_periods`
    SetScanPeriods(ScanPeriods),
}

#[derive(Debug)]
struct Script {
    ble_supported: bool,
    ble_enabled: bool,
    requires_permission: bool,
    permission_granted: bool,
    permission_gate: Option<Arc<Notify>>,
    bind_failure: Option<String>,
    bind_gate: Option<Arc<Notify>>,
    auto_range: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            ble_supported: true,
            ble_enabled: true,
            requires_permission: false,
            permission_granted: true,
            permission_gate: None,
            bind_failure: None,
            bind_gate: None,
            auto_range: true,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    bound: bool,
    listener: Option<mpsc::Sender<RawBeaconEvent>>,
    monitored: Vec<MonitoringDescriptor>,
    ranging: HashSet<String>,
    background: bool,
    periods: Option<ScanPeriods>,
    calls: Vec<BackendCall>,
}

/// A backend driven entirely from code.
#[derive(Debug, Default)]
pub struct MockBackend {
    script: Script,
    state: Mutex<MockState>,
}

impl MockBackend {
    /// A backend with BLE supported and enabled, no permission prompt and
    /// ranging for every monitored region.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report BLE as switched on or off.
    #[must_use]
    pub fn with_ble_enabled(mut self, enabled: bool) -> Self {
        self.script.ble_enabled = enabled;
        self
    }

    /// Report BLE hardware as present or absent.
    #[must_use]
    pub fn with_ble_supported(mut self, supported: bool) -> Self {
        self.script.ble_supported = supported;
        self
    }

    /// Require a runtime permission prompt answered with `granted`.
    #[must_use]
    pub fn with_permission(mut self, granted: bool) -> Self {
        self.script.requires_permission = true;
        self.script.permission_granted = granted;
        self
    }

    /// Hold the permission answer until `gate` is notified.
    #[must_use]
    pub fn with_permission_gate(mut self, gate: Arc<Notify>) -> Self {
        self.script.requires_permission = true;
        self.script.permission_gate = Some(gate);
        self
    }

    /// Make every bind fail with `reason`.
    #[must_use]
    pub fn with_bind_failure(mut self, reason: impl Into<String>) -> Self {
        self.script.bind_failure = Some(reason.into());
        self
    }

    /// Hold every bind until `gate` is notified.
    #[must_use]
    pub fn with_bind_gate(mut self, gate: Arc<Notify>) -> Self {
        self.script.bind_gate = Some(gate);
        self
    }

    /// Only range regions reported inside via [`set_region_state`](Self::set_region_state).
    #[must_use]
    pub fn without_auto_range(mut self) -> Self {
        self.script.auto_range = false;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn log(&self, call: BackendCall) {
        self.lock().calls.push(call);
    }

    /// Every call made so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    /// How many recorded calls satisfy `pred`.
    pub fn count_calls(&self, pred: impl Fn(&BackendCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Regions currently monitored.
    #[must_use]
    pub fn monitored_regions(&self) -> Vec<MonitoringDescriptor> {
        self.lock().monitored.clone()
    }

    /// Whether a listener channel is attached.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.lock().listener.is_some()
    }

    /// Whether the low-power profile is active.
    #[must_use]
    pub fn background_mode(&self) -> bool {
        self.lock().background
    }

    /// The scan periods last applied.
    #[must_use]
    pub fn scan_periods(&self) -> Option<ScanPeriods> {
        self.lock().periods
    }

    /// Report entering (`inside`) or leaving a monitored region. Regions
    /// inside are ranged when auto ranging is off.
    pub fn set_region_state(&self, uuid: &str, inside: bool) {
        let uuid = uuid.to_uppercase();
        let mut state = self.lock();
        if inside {
            debug!(%uuid, "mock region entered, ranging");
            state.ranging.insert(uuid);
        } else {
            debug!(%uuid, "mock region exited, stop ranging");
            state.ranging.remove(&uuid);
        }
    }

    /// Deliver a raw event as if the radio had seen it.
    ///
    /// Returns `false` when nothing is listening, or when the event's UUID is
    /// not monitored or not being ranged. Events that do not map to a signal
    /// are delivered as is.
    pub fn emit(&self, event: RawBeaconEvent) -> bool {
        let state = self.lock();
        let Some(listener) = state.listener.clone() else {
            return false;
        };
        if let Ok(signal) = event.to_signal() {
            let monitored = state
                .monitored
                .iter()
                .any(|d| d.region.uuid.eq_ignore_ascii_case(&signal.uuid));
            let ranging = self.script.auto_range || state.ranging.contains(&signal.uuid.to_uppercase());
            if !monitored || !ranging {
                return false;
            }
        }
        drop(state);
        listener.try_send(event).is_ok()
    }
}

#[async_trait]
impl ScanBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn is_ble_supported(&self) -> bool {
        self.script.ble_supported
    }

    async fn is_ble_enabled(&self) -> bool {
        self.script.ble_supported && self.script.ble_enabled
    }

    fn requires_permission(&self) -> bool {
        self.script.requires_permission
    }

    async fn request_permission(&self) -> bool {
        self.log(BackendCall::RequestPermission);
        if let Some(gate) = &self.script.permission_gate {
            gate.notified().await;
        }
        self.script.permission_granted
    }

    async fn bind(&self) -> Result<()> {
        self.log(BackendCall::Bind);
        if let Some(gate) = &self.script.bind_gate {
            gate.notified().await;
        }
        if let Some(reason) = &self.script.bind_failure {
            return Err(BeaconError::BindFailed(reason.clone()));
        }
        self.lock().bound = true;
        Ok(())
    }

    fn is_bound(&self) -> bool {
        self.lock().bound
    }

    async fn unbind(&self) {
        let mut state = self.lock();
        state.calls.push(BackendCall::Unbind);
        state.bound = false;
    }

    async fn start_monitoring(&self, region: &MonitoringDescriptor) -> Result<()> {
        let mut state = self.lock();
        state
            .calls
            .push(BackendCall::StartMonitoring(region.region.uuid.clone()));
        state.monitored.push(region.clone());
        Ok(())
    }

    async fn stop_monitoring_all(&self) {
        let mut state = self.lock();
        state.calls.push(BackendCall::StopMonitoringAll);
        state.monitored.clear();
        state.ranging.clear();
    }

    fn add_listeners(&self, events: mpsc::Sender<RawBeaconEvent>) {
        let mut state = self.lock();
        state.calls.push(BackendCall::AddListeners);
        state.listener = Some(events);
    }

    fn remove_listeners(&self) {
        let mut state = self.lock();
        state.calls.push(BackendCall::RemoveListeners);
        state.listener = None;
    }

    fn supports_background_mode(&self) -> bool {
        true
    }

    async fn set_background_mode(&self, background: bool) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(BackendCall::SetBackgroundMode(background));
        state.background = background;
        Ok(())
    }

    fn supports_behavior(&self) -> bool {
        true
    }

    fn set_scan_periods(&self, periods: ScanPeriods) {
        let mut state = self.lock();
        state.calls.push(BackendCall::SetScanPeriods(periods));
        state.periods = Some(periods);
    }
}
