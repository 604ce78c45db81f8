//! Linux BlueZ backend.
//!
//! Binding opens a D-Bus session to `bluetoothd`, takes the default adapter
//! and sets an LE discovery filter that reports duplicate advertisements.
//! Once listeners are attached a discovery task decodes Apple manufacturer
//! data into iBeacon frames and forwards those whose UUID is monitored.
//!
//! BlueZ has no duty-cycled ranging, so scan periods are emulated by
//! forwarding at most one advertisement per beacon per scan cycle of the
//! current (foreground or background) profile.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures::{pin_mut, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{ScanBackend, ScanBehavior, ScanPeriods};
use crate::error::{BeaconError, Result};
use crate::mapper::{IBeaconAdvertisement, RawBeaconEvent, APPLE_COMPANY_ID};
use crate::region::MonitoringDescriptor;

#[derive(Debug)]
struct Routing {
    monitored: HashSet<String>,
    listener: Option<mpsc::Sender<RawBeaconEvent>>,
    background: bool,
    periods: ScanPeriods,
}

impl Routing {
    fn target(&self, uuid: &str) -> Option<(mpsc::Sender<RawBeaconEvent>, Duration)> {
        if !self.monitored.contains(uuid) {
            return None;
        }
        let listener = self.listener.clone()?;
        Some((listener, self.periods.cycle(self.background)))
    }
}

#[derive(Default)]
struct Binding {
    session: Option<Session>,
    adapter: Option<Adapter>,
    discovery: Option<JoinHandle<()>>,
}

/// BlueZ scanning over D-Bus.
pub struct BluezBackend {
    binding: Mutex<Binding>,
    routing: Arc<Mutex<Routing>>,
}

impl std::fmt::Debug for BluezBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BluezBackend")
            .field("bound", &self.is_bound())
            .finish_non_exhaustive()
    }
}

impl Default for BluezBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BluezBackend {
    /// An unbound backend using the proactive profile.
    #[must_use]
    pub fn new() -> Self {
        Self {
            binding: Mutex::new(Binding::default()),
            routing: Arc::new(Mutex::new(Routing {
                monitored: HashSet::new(),
                listener: None,
                background: false,
                periods: ScanBehavior::Proactive.periods(),
            })),
        }
    }

    fn binding(&self) -> MutexGuard<'_, Binding> {
        self.binding.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn routing(&self) -> MutexGuard<'_, Routing> {
        self.routing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn default_adapter() -> bluer::Result<(Session, Adapter)> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        Ok((session, adapter))
    }

    fn spawn_discovery(&self, binding: &mut Binding) {
        if binding.discovery.is_some() {
            return;
        }
        let Some(adapter) = binding.adapter.clone() else {
            return;
        };
        let routing = Arc::clone(&self.routing);
        binding.discovery = Some(tokio::spawn(async move {
            if let Err(e) = discover(adapter, routing).await {
                warn!(error = %e, "BlueZ discovery ended");
            }
        }));
    }

    fn stop_discovery(binding: &mut Binding) {
        if let Some(task) = binding.discovery.take() {
            task.abort();
        }
    }
}

async fn discover(adapter: Adapter, routing: Arc<Mutex<Routing>>) -> bluer::Result<()> {
    let events = adapter.discover_devices_with_changes().await?;
    info!(adapter = adapter.name(), "BlueZ discovery running");

    let reads = events
        .filter_map(|event| async move {
            match event {
                AdapterEvent::DeviceAdded(address) => Some(address),
                _ => None,
            }
        })
        .then(move |address| {
            let adapter = adapter.clone();
            async move { (address, read_advertisement(&adapter, address).await) }
        });
    forward_advertisements(reads, &routing).await;
    Ok(())
}

async fn read_advertisement(
    adapter: &Adapter,
    address: Address,
) -> bluer::Result<Option<IBeaconAdvertisement>> {
    let device = adapter.device(address)?;
    let Some(payload) = device
        .manufacturer_data()
        .await?
        .and_then(|mut data| data.remove(&APPLE_COMPANY_ID))
    else {
        return Ok(None);
    };
    Ok(Some(IBeaconAdvertisement {
        payload,
        rssi: device.rssi().await?,
    }))
}

/// Forward monitored iBeacon advertisements, at most one per beacon per scan
/// cycle. A device that cannot be read is skipped.
async fn forward_advertisements<S, A, E>(reads: S, routing: &Mutex<Routing>)
where
    S: Stream<Item = (A, std::result::Result<Option<IBeaconAdvertisement>, E>)>,
    A: Display,
    E: Display,
{
    pin_mut!(reads);
    let mut last_forwarded: HashMap<(String, u16, u16), Instant> = HashMap::new();

    while let Some((address, read)) = reads.next().await {
        let advertisement = match read {
            Ok(Some(advertisement)) => advertisement,
            Ok(None) => continue,
            Err(e) => {
                debug!(%address, error = %e, "cannot read device, skipping");
                continue;
            }
        };
        let Ok(frame) = advertisement.frame() else {
            continue;
        };

        let target = routing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .target(&frame.uuid);
        let Some((listener, cycle)) = target else {
            continue;
        };

        let key = (frame.uuid, frame.major, frame.minor);
        let now = Instant::now();
        if last_forwarded
            .get(&key)
            .is_some_and(|last| now.duration_since(*last) < cycle)
        {
            continue;
        }
        last_forwarded.insert(key, now);

        trace!(%address, rssi = ?advertisement.rssi, "iBeacon advertisement");
        if listener
            .try_send(RawBeaconEvent::Advertisement(advertisement))
            .is_err()
        {
            debug!("event channel full or closed, dropping advertisement");
        }
    }
}

#[async_trait]
impl ScanBackend for BluezBackend {
    fn name(&self) -> &'static str {
        "bluez"
    }

    async fn is_ble_supported(&self) -> bool {
        Self::default_adapter().await.is_ok()
    }

    async fn is_ble_enabled(&self) -> bool {
        match Self::default_adapter().await {
            Ok((_session, adapter)) => adapter.is_powered().await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn bind(&self) -> Result<()> {
        let (session, adapter) = Self::default_adapter()
            .await
            .map_err(|e| BeaconError::BindFailed(e.to_string()))?;
        if !adapter.is_powered().await.unwrap_or(false) {
            return Err(BeaconError::BindFailed(format!(
                "adapter {} is powered off",
                adapter.name()
            )));
        }
        adapter
            .set_discovery_filter(DiscoveryFilter {
                transport: DiscoveryTransport::Le,
                duplicate_data: true,
                ..Default::default()
            })
            .await
            .map_err(|e| BeaconError::BindFailed(e.to_string()))?;

        info!(adapter = adapter.name(), "BlueZ adapter bound");
        let mut binding = self.binding();
        binding.session = Some(session);
        binding.adapter = Some(adapter);
        if self.routing().listener.is_some() {
            self.spawn_discovery(&mut binding);
        }
        Ok(())
    }

    fn is_bound(&self) -> bool {
        self.binding().adapter.is_some()
    }

    async fn unbind(&self) {
        let mut binding = self.binding();
        Self::stop_discovery(&mut binding);
        binding.adapter = None;
        binding.session = None;
        debug!("BlueZ adapter released");
    }

    async fn start_monitoring(&self, region: &MonitoringDescriptor) -> Result<()> {
        if !self.is_bound() {
            return Err(BeaconError::BackendFailure(
                "cannot monitor before the adapter is bound".into(),
            ));
        }
        self.routing()
            .monitored
            .insert(region.region.uuid.to_uppercase());
        Ok(())
    }

    async fn stop_monitoring_all(&self) {
        self.routing().monitored.clear();
    }

    fn add_listeners(&self, events: mpsc::Sender<RawBeaconEvent>) {
        self.routing().listener = Some(events);
        let mut binding = self.binding();
        self.spawn_discovery(&mut binding);
    }

    fn remove_listeners(&self) {
        self.routing().listener = None;
        Self::stop_discovery(&mut self.binding());
    }

    fn supports_background_mode(&self) -> bool {
        true
    }

    async fn set_background_mode(&self, background: bool) -> Result<()> {
        self.routing().background = background;
        Ok(())
    }

    fn supports_behavior(&self) -> bool {
        true
    }

    fn set_scan_periods(&self, periods: ScanPeriods) {
        self.routing().periods = periods;
    }
}
