//! BlinkStick USB indicators via nusb
//!
//! A BlinkStick is a HID device whose identity is its USB serial number
//! (e.g. `BS000123-3.0`). The color is set with a HID SET_REPORT feature
//! report `[1, r, g, b]` sent as a class control transfer addressed to the
//! device (bmRequestType `0x20`), the same setup the vendor's node and
//! Python drivers send. usbhid stays bound, so no interface is claimed.

use buildlight_core::{HardwareIdentity, Rgb};
use nusb::transfer::{Control, ControlType, Recipient};
use nusb::DeviceInfo;
use std::time::Duration;
use tracing::{debug, trace};

use crate::transport::{DeviceTransport, TransportError};

/// BlinkStick USB vendor ID
pub const BLINKSTICK_VID: u16 = 0x20a0;

/// BlinkStick USB product ID
pub const BLINKSTICK_PID: u16 = 0x41e5;

/// HID class request SET_REPORT
const HID_SET_REPORT: u8 = 0x09;

/// wValue carries the report ID only
const COLOR_REPORT_VALUE: u16 = 0x0001;

const CONTROL_TIMEOUT: Duration = Duration::from_millis(500);

/// Handle to one enumerated BlinkStick
#[derive(Debug, Clone)]
pub struct BlinkStickHandle {
    info: DeviceInfo,
}

impl BlinkStickHandle {
    fn describe(&self) -> String {
        format!(
            "bus {} address {}",
            self.info.bus_number(),
            self.info.device_address()
        )
    }
}

/// BlinkStick transport backed by the host USB stack
#[derive(Debug, Clone, Default)]
pub struct BlinkStickTransport;

impl BlinkStickTransport {
    pub fn new() -> Self {
        Self
    }
}

/// Build the feature report that sets a color
fn color_report(color: Rgb) -> [u8; 4] {
    [1, color.r, color.g, color.b]
}

/// Setup packet for the color report
fn color_control() -> Control {
    Control {
        control_type: ControlType::Class,
        recipient: Recipient::Device,
        request: HID_SET_REPORT,
        value: COLOR_REPORT_VALUE,
        index: 0,
    }
}

impl DeviceTransport for BlinkStickTransport {
    type Handle = BlinkStickHandle;

    fn enumerate(&self) -> Result<Vec<Self::Handle>, TransportError> {
        let mut found: Vec<DeviceInfo> = nusb::list_devices()?
            .filter(|info| info.vendor_id() == BLINKSTICK_VID && info.product_id() == BLINKSTICK_PID)
            .collect();

        // Stable slot order so the change monitor can compare slot by slot
        found.sort_by_key(|info| (info.bus_number(), info.device_address()));

        trace!(count = found.len(), "Enumerated BlinkStick devices");
        Ok(found.into_iter().map(|info| BlinkStickHandle { info }).collect())
    }

    async fn identity(&self, handle: &Self::Handle) -> Result<HardwareIdentity, TransportError> {
        handle
            .info
            .serial_number()
            .map(HardwareIdentity::new)
            .ok_or_else(|| TransportError::NoSerial(handle.describe()))
    }

    fn set_color(&self, handle: &Self::Handle, color: Rgb) -> Result<(), TransportError> {
        let device = handle.info.open()?;
        let report = color_report(color);

        device.control_out_blocking(color_control(), &report, CONTROL_TIMEOUT)?;

        debug!(device = %handle.describe(), color = %color, "Set BlinkStick color");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_report_layout() {
        assert_eq!(color_report(Rgb::new(0x12, 0x34, 0x56)), [1, 0x12, 0x34, 0x56]);
        assert_eq!(color_report(Rgb::AMBER), [1, 0xff, 0xbf, 0x00]);
    }

    #[test]
    fn test_color_control_targets_device() {
        let control = color_control();
        // bmRequestType 0x20: host to device, class, device recipient
        assert!(matches!(control.control_type, ControlType::Class));
        assert!(matches!(control.recipient, Recipient::Device));
        assert_eq!(control.request, 0x09);
        assert_eq!(control.value, 0x0001);
        assert_eq!(control.index, 0);
    }
}
