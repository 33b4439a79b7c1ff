//! In-memory device bench
//!
//! Simulates indicator devices being plugged and unplugged without any USB
//! hardware. Every color written is recorded per identity so callers can
//! inspect what a device would have shown.

use buildlight_core::{HardwareIdentity, Rgb};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::info;

use crate::transport::{DeviceTransport, TransportError};

/// Handle to one virtual device; stays valid only while that device is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualHandle(u64);

#[derive(Debug)]
struct VirtualDevice {
    handle: VirtualHandle,
    identity: HardwareIdentity,
}

#[derive(Debug, Default)]
struct Bench {
    slots: Vec<VirtualDevice>,
    next_handle: u64,
    history: HashMap<HardwareIdentity, Vec<Rgb>>,
}

impl Bench {
    fn allocate(&mut self) -> VirtualHandle {
        self.next_handle += 1;
        VirtualHandle(self.next_handle)
    }

    fn identity_of(&self, handle: VirtualHandle) -> Option<&HardwareIdentity> {
        self.slots
            .iter()
            .find(|device| device.handle == handle)
            .map(|device| &device.identity)
    }
}

/// Virtual transport; clones share the same bench
#[derive(Debug, Clone, Default)]
pub struct VirtualTransport {
    bench: Arc<Mutex<Bench>>,
    identity_delay: Duration,
}

impl VirtualTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bench with the given devices attached in slot order
    pub fn with_devices<I, S>(identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let transport = Self::new();
        for identity in identities {
            transport.attach(identity);
        }
        transport
    }

    /// Make every identity read take `delay`
    pub fn with_identity_delay(mut self, delay: Duration) -> Self {
        self.identity_delay = delay;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Bench> {
        self.bench.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Plug a device into the next free slot
    pub fn attach(&self, identity: impl Into<String>) -> VirtualHandle {
        let mut bench = self.lock();
        let handle = bench.allocate();
        bench.slots.push(VirtualDevice {
            handle,
            identity: HardwareIdentity::new(identity),
        });
        handle
    }

    /// Unplug a device; returns false if it was not attached
    pub fn detach(&self, identity: &str) -> bool {
        let mut bench = self.lock();
        let before = bench.slots.len();
        bench.slots.retain(|device| device.identity.as_str() != identity);
        bench.slots.len() != before
    }

    /// Unplug `old` and plug `new` into the same slot in one step
    pub fn swap(&self, old: &str, new: impl Into<String>) -> bool {
        let mut bench = self.lock();
        let handle = bench.allocate();
        match bench
            .slots
            .iter_mut()
            .find(|device| device.identity.as_str() == old)
        {
            Some(device) => {
                device.handle = handle;
                device.identity = HardwareIdentity::new(new);
                true
            }
            None => false,
        }
    }

    /// Every color written to `identity`, oldest first
    pub fn colors(&self, identity: &str) -> Vec<Rgb> {
        self.lock()
            .history
            .get(&HardwareIdentity::new(identity))
            .cloned()
            .unwrap_or_default()
    }

    pub fn last_color(&self, identity: &str) -> Option<Rgb> {
        self.colors(identity).last().copied()
    }

    pub fn attached(&self) -> Vec<HardwareIdentity> {
        self.lock()
            .slots
            .iter()
            .map(|device| device.identity.clone())
            .collect()
    }
}

impl DeviceTransport for VirtualTransport {
    type Handle = VirtualHandle;

    fn enumerate(&self) -> Result<Vec<Self::Handle>, TransportError> {
        Ok(self.lock().slots.iter().map(|device| device.handle).collect())
    }

    async fn identity(&self, handle: &Self::Handle) -> Result<HardwareIdentity, TransportError> {
        if !self.identity_delay.is_zero() {
            tokio::time::sleep(self.identity_delay).await;
        }
        self.lock()
            .identity_of(*handle)
            .cloned()
            .ok_or_else(|| TransportError::Disconnected(format!("{:?}", handle)))
    }

    fn set_color(&self, handle: &Self::Handle, color: Rgb) -> Result<(), TransportError> {
        let mut bench = self.lock();
        let identity = bench
            .identity_of(*handle)
            .cloned()
            .ok_or_else(|| TransportError::Disconnected(format!("{:?}", handle)))?;
        info!(device = %identity, color = %color, "Virtual device color");
        bench.history.entry(identity).or_default().push(color);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_attach_detach_and_colors() {
        let transport = VirtualTransport::with_devices(["dev-1", "dev-2"]);
        let handles = transport.enumerate().unwrap();
        assert_eq!(handles.len(), 2);

        let identity = transport.identity(&handles[1]).await.unwrap();
        assert_eq!(identity.as_str(), "dev-2");

        transport.set_color(&handles[0], Rgb::GREEN).unwrap();
        assert_eq!(transport.last_color("dev-1"), Some(Rgb::GREEN));

        assert!(transport.detach("dev-1"));
        assert!(!transport.detach("dev-1"));
        assert!(transport.set_color(&handles[0], Rgb::RED).is_err());
        assert!(transport.identity(&handles[0]).await.is_err());
        assert_eq!(transport.colors("dev-1"), vec![Rgb::GREEN]);
    }

    #[tokio::test]
    async fn test_swap_keeps_slot_and_invalidates_handle() {
        let transport = VirtualTransport::with_devices(["dev-1", "dev-2"]);
        let old = transport.enumerate().unwrap();

        assert!(transport.swap("dev-1", "dev-3"));
        let new = transport.enumerate().unwrap();
        assert_eq!(new.len(), 2);
        assert_ne!(old[0], new[0]);
        assert_eq!(transport.identity(&new[0]).await.unwrap().as_str(), "dev-3");
        assert!(transport.identity(&old[0]).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_delay() {
        let transport = VirtualTransport::with_devices(["dev-1"])
            .with_identity_delay(Duration::from_millis(250));
        let handle = transport.enumerate().unwrap()[0];

        let started = tokio::time::Instant::now();
        transport.identity(&handle).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(250));
    }
}
