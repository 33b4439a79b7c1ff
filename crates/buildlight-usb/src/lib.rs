//! Buildlight USB - Indicator device transports
//!
//! This crate implements the device transport capability used by the
//! registry:
//! - BlinkStick lights on the host USB bus (via nusb)
//! - A virtual in-memory bench for tests and hardware-free runs

pub mod blinkstick;
pub mod transport;
pub mod virtual_bench;

pub use blinkstick::{BlinkStickHandle, BlinkStickTransport, BLINKSTICK_PID, BLINKSTICK_VID};
pub use transport::{DeviceTransport, TransportError};
pub use virtual_bench::{VirtualHandle, VirtualTransport};
