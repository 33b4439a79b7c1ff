//! Device registry - the single owner of attached indicator devices
//!
//! The registry keeps the identity-to-handle table for the devices found by
//! the most recent applied enumeration, plus the ordered identity slots that
//! the change monitor compares against.

use buildlight_core::{Generation, HardwareIdentity, Rgb};
use buildlight_usb::DeviceTransport;
use futures_util::future::join_all;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// One enumerated device slot
#[derive(Debug, Clone)]
pub struct DiscoveredDevice<H> {
    pub slot: usize,
    /// `None` when the identity read failed (device vanished mid-read)
    pub identity: Option<HardwareIdentity>,
    pub handle: H,
}

/// Result of enumerating the hardware for one reconciliation cycle
#[derive(Debug, Clone)]
pub struct Enumeration<H> {
    pub generation: Generation,
    pub devices: Vec<DiscoveredDevice<H>>,
}

/// What the change monitor noticed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyChange {
    Count {
        was: usize,
        now: usize,
    },
    Identity {
        slot: usize,
        was: Option<HardwareIdentity>,
        now: Option<HardwareIdentity>,
    },
}

impl std::fmt::Display for TopologyChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count { was, now } => write!(f, "device count changed from {} to {}", was, now),
            Self::Identity { slot, was, now } => write!(
                f,
                "slot {} changed from {} to {}",
                slot,
                was.as_ref().map(|id| id.as_str()).unwrap_or("<unknown>"),
                now.as_ref().map(|id| id.as_str()).unwrap_or("<unknown>"),
            ),
        }
    }
}

/// Running change monitor; dropping it stops the poll
#[derive(Debug)]
pub struct ChangeMonitor {
    task: JoinHandle<()>,
}

impl ChangeMonitor {
    /// True once a change has been reported
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ChangeMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct DeviceRegistry<T: DeviceTransport> {
    transport: Arc<T>,
    devices: HashMap<HardwareIdentity, T::Handle>,
    slots: Vec<Option<HardwareIdentity>>,
}

impl<T: DeviceTransport> DeviceRegistry<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            devices: HashMap::new(),
            slots: Vec::new(),
        }
    }

    /// Enumerate the hardware for `generation`.
    ///
    /// The returned future is detached from the registry so it can run
    /// while the registry keeps serving color commands. Identities are read
    /// concurrently.
    pub fn enumerate(
        &self,
        generation: Generation,
    ) -> impl Future<Output = Enumeration<T::Handle>> + Send + 'static {
        let transport = Arc::clone(&self.transport);
        async move {
            let handles = list_handles(&*transport);
            let identities = join_all(handles.iter().map(|handle| transport.identity(handle))).await;

            let devices = handles
                .into_iter()
                .zip(identities)
                .enumerate()
                .map(|(slot, (handle, identity))| {
                    let identity = match identity {
                        Ok(identity) => Some(identity),
                        Err(e) => {
                            debug!(slot, error = %e, "Could not read device identity");
                            None
                        }
                    };
                    DiscoveredDevice {
                        slot,
                        identity,
                        handle,
                    }
                })
                .collect();

            Enumeration {
                generation,
                devices,
            }
        }
    }

    /// Replace the registry contents with `enumeration`.
    ///
    /// Returns the identities now attached, in slot order.
    pub fn apply(&mut self, enumeration: Enumeration<T::Handle>) -> Vec<HardwareIdentity> {
        self.devices.clear();
        self.slots.clear();

        let mut attached = Vec::new();
        for device in enumeration.devices {
            self.slots.push(device.identity.clone());

            let Some(identity) = device.identity else {
                continue;
            };
            if self.devices.contains_key(&identity) {
                warn!(device = %identity, slot = device.slot, "Duplicate device identity, ignoring slot");
                continue;
            }
            self.devices.insert(identity.clone(), device.handle);
            attached.push(identity);
        }

        info!(
            generation = %enumeration.generation,
            slots = self.slots.len(),
            devices = attached.len(),
            "Device registry updated"
        );
        attached
    }

    /// Poll for topology changes every `period`.
    ///
    /// On the first difference from the last applied enumeration the monitor
    /// calls `on_change` and stops; it must be started again after the
    /// change has been handled.
    pub fn start_change_monitor<F>(&self, period: Duration, on_change: F) -> ChangeMonitor
    where
        F: FnOnce(TopologyChange) + Send + 'static,
    {
        let transport = Arc::clone(&self.transport);
        let known = self.slots.clone();

        debug!(slots = known.len(), period_ms = period.as_millis() as u64, "Starting change monitor");

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Some(change) = detect_change(&*transport, &known).await {
                    info!(change = %change, "Device topology changed, stopping monitor");
                    on_change(change);
                    return;
                }
            }
        });

        ChangeMonitor { task }
    }

    /// Show `color` on a device. Unknown or vanished devices are ignored.
    pub fn set_color(&self, identity: &HardwareIdentity, color: Rgb) {
        let Some(handle) = self.devices.get(identity) else {
            debug!(device = %identity, color = %color, "Color for unknown device ignored");
            return;
        };
        match self.transport.set_color(handle, color) {
            Ok(()) => {}
            Err(e) if e.is_disconnected() => {
                debug!(device = %identity, error = %e, "Device vanished before color was set");
            }
            Err(e) => {
                warn!(device = %identity, color = %color, error = %e, "Could not set device color");
            }
        }
    }

    pub fn contains(&self, identity: &HardwareIdentity) -> bool {
        self.devices.contains_key(identity)
    }

    /// Attached identities in slot order
    pub fn identities(&self) -> Vec<HardwareIdentity> {
        let mut seen = HashSet::new();
        self.slots
            .iter()
            .flatten()
            .filter(|identity| self.devices.contains_key(*identity) && seen.insert(*identity))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

fn list_handles<T: DeviceTransport>(transport: &T) -> Vec<T::Handle> {
    match transport.enumerate() {
        Ok(handles) => handles,
        Err(e) => {
            warn!(error = %e, "Device enumeration failed, treating as no devices");
            Vec::new()
        }
    }
}

/// Compare live hardware against the known slots: count first, then the
/// identity in every slot. Removal followed by reinsertion can keep the count
/// while changing identities.
async fn detect_change<T: DeviceTransport>(
    transport: &T,
    known: &[Option<HardwareIdentity>],
) -> Option<TopologyChange> {
    let handles = list_handles(transport);
    if handles.len() != known.len() {
        return Some(TopologyChange::Count {
            was: known.len(),
            now: handles.len(),
        });
    }

    let identities = join_all(handles.iter().map(|handle| transport.identity(handle))).await;
    identities
        .into_iter()
        .zip(known)
        .enumerate()
        .find_map(|(slot, (now, was))| {
            let now = now.ok();
            (now.as_ref() != was.as_ref()).then(|| TopologyChange::Identity {
                slot,
                was: was.clone(),
                now,
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildlight_usb::VirtualTransport;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    const PERIOD: Duration = Duration::from_secs(1);

    async fn registry_with(transport: &VirtualTransport) -> DeviceRegistry<VirtualTransport> {
        let mut registry = DeviceRegistry::new(Arc::new(transport.clone()));
        let enumeration = registry.enumerate(Generation(1)).await;
        registry.apply(enumeration);
        registry
    }

    fn monitor(
        registry: &DeviceRegistry<VirtualTransport>,
    ) -> (ChangeMonitor, oneshot::Receiver<TopologyChange>) {
        let (tx, rx) = oneshot::channel();
        let monitor = registry.start_change_monitor(PERIOD, move |change| {
            let _ = tx.send(change);
        });
        (monitor, rx)
    }

    #[tokio::test]
    async fn test_apply_matches_enumeration() {
        let transport = VirtualTransport::with_devices(["dev-1", "dev-2"]);
        let registry = registry_with(&transport).await;

        assert_eq!(
            registry.identities(),
            vec![HardwareIdentity::new("dev-1"), HardwareIdentity::new("dev-2")]
        );

        transport.detach("dev-1");
        let mut registry = registry;
        let enumeration = registry.enumerate(Generation(2)).await;
        assert_eq!(enumeration.generation, Generation(2));
        registry.apply(enumeration);
        assert_eq!(registry.identities(), vec![HardwareIdentity::new("dev-2")]);
        assert!(!registry.contains(&HardwareIdentity::new("dev-1")));
    }

    #[tokio::test]
    async fn test_duplicate_identity_keeps_first_slot() {
        let transport = VirtualTransport::with_devices(["dev-1", "dev-1"]);
        let registry = registry_with(&transport).await;
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.identities(), vec![HardwareIdentity::new("dev-1")]);
    }

    #[tokio::test]
    async fn test_set_color_on_unknown_or_vanished_device_is_noop() {
        let transport = VirtualTransport::with_devices(["dev-1"]);
        let registry = registry_with(&transport).await;

        registry.set_color(&HardwareIdentity::new("dev-1"), Rgb::GREEN);
        registry.set_color(&HardwareIdentity::new("nobody"), Rgb::RED);
        transport.detach("dev-1");
        registry.set_color(&HardwareIdentity::new("dev-1"), Rgb::RED);

        assert_eq!(transport.colors("dev-1"), vec![Rgb::GREEN]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_reports_count_change_once() {
        let transport = VirtualTransport::with_devices(["dev-1", "dev-2"]);
        let registry = registry_with(&transport).await;
        let (monitor, rx) = monitor(&registry);

        transport.detach("dev-2");
        let change = timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
        assert_eq!(change, TopologyChange::Count { was: 2, now: 1 });

        tokio::task::yield_now().await;
        assert!(monitor.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_detects_swap_with_same_count() {
        let transport = VirtualTransport::with_devices(["dev-1", "dev-2"]);
        let registry = registry_with(&transport).await;
        let (_monitor, rx) = monitor(&registry);

        transport.swap("dev-2", "dev-3");
        let change = timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
        assert_eq!(
            change,
            TopologyChange::Identity {
                slot: 1,
                was: Some(HardwareIdentity::new("dev-2")),
                now: Some(HardwareIdentity::new("dev-3")),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_stays_quiet_without_changes() {
        let transport = VirtualTransport::with_devices(["dev-1"]);
        let registry = registry_with(&transport).await;
        let (monitor, rx) = monitor(&registry);

        assert!(timeout(Duration::from_secs(30), rx).await.is_err());
        assert!(!monitor.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_runs_with_zero_devices() {
        let transport = VirtualTransport::new();
        let registry = registry_with(&transport).await;
        assert!(registry.is_empty());
        let (_monitor, rx) = monitor(&registry);

        tokio::time::sleep(Duration::from_secs(10)).await;
        transport.attach("dev-1");
        let change = timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
        assert_eq!(change, TopologyChange::Count { was: 0, now: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_monitor_never_fires() {
        let transport = VirtualTransport::with_devices(["dev-1"]);
        let registry = registry_with(&transport).await;
        let (monitor, rx) = monitor(&registry);

        drop(monitor);
        transport.detach("dev-1");
        // sender dropped with the aborted task
        assert!(timeout(Duration::from_secs(5), rx).await.unwrap().is_err());
    }
}
