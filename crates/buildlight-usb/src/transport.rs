//! Device transport capability consumed by the registry

use buildlight_core::{HardwareIdentity, Rgb};
use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("USB error: {0}")]
    Usb(#[from] std::io::Error),
    #[error("USB transfer failed: {0}")]
    Transfer(#[from] nusb::transfer::TransferError),
    #[error("Device {0} is no longer attached")]
    Disconnected(String),
    #[error("Device {0} reports no serial number")]
    NoSerial(String),
}

impl TransportError {
    /// The device went away; writes to it are expected to fail
    pub fn is_disconnected(&self) -> bool {
        matches!(
            self,
            Self::Disconnected(_) | Self::Transfer(nusb::transfer::TransferError::Disconnected)
        )
    }
}

/// Enumerate indicator devices, read their identities and color them.
///
/// Implementations do I/O only; retry, staleness and binding policy live in
/// the registry and reconciler.
pub trait DeviceTransport: Send + Sync + 'static {
    /// Opaque per-enumeration handle to one physical device
    type Handle: Clone + std::fmt::Debug + Send + Sync + 'static;

    /// List attached devices in a stable slot order
    fn enumerate(&self) -> Result<Vec<Self::Handle>, TransportError>;

    /// Read the stable hardware identity of a device
    fn identity(
        &self,
        handle: &Self::Handle,
    ) -> impl Future<Output = Result<HardwareIdentity, TransportError>> + Send;

    /// Show a color on a device
    fn set_color(&self, handle: &Self::Handle, color: Rgb) -> Result<(), TransportError>;
}
