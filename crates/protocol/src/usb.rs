//! USB identifiers and serial device path helpers.

use std::path::PathBuf;

/// USB vendor ID of the supported devices.
pub const VENDOR_ID: u16 = 0x0da4;

/// Product ID of devices speaking the HID framing.
pub const HID_PRODUCT_ID: u16 = 0x0008;

/// Product ID of devices speaking the CDC-ACM framing.
pub const ACM_PRODUCT_ID: u16 = 0x0014;

/// Default serial device of an ACM device.
pub const DEFAULT_SERIAL_DEVICE: &str = "/dev/ttyACM0";

/// Environment variable to override the serial device path.
pub const SERIAL_DEVICE_ENV_VAR: &str = "POLARSYNC_SERIAL_DEVICE";

/// Get the serial device path to use for an ACM device.
///
/// Checks the `POLARSYNC_SERIAL_DEVICE` environment variable first,
/// falling back to `/dev/ttyACM0`.
#[must_use]
pub fn get_serial_device_path() -> PathBuf {
    std::env::var(SERIAL_DEVICE_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_SERIAL_DEVICE))
}
