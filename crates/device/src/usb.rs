//! USB device lookup.

use crate::error::{Error, Result};

/// Descriptor strings read from the device at connect time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsbIdentity {
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl UsbIdentity {
    pub(crate) fn from_device(device: &nusb::DeviceInfo) -> Self {
        Self {
            product: device.product_string().map(str::to_string),
            serial_number: device.serial_number().map(str::to_string),
        }
    }
}

/// Find the first connected device with the given IDs.
pub fn find_device(vendor_id: u16, product_id: u16) -> Result<Option<nusb::DeviceInfo>> {
    let mut devices = nusb::list_devices().map_err(Error::from_usb_open)?;
    let found = devices.find(|d| d.vendor_id() == vendor_id && d.product_id() == product_id);

    match &found {
        Some(d) => tracing::debug!(
            vendor_id = format_args!("{vendor_id:04x}"),
            product_id = format_args!("{product_id:04x}"),
            bus = d.bus_number(),
            address = d.device_address(),
            "Found USB device"
        ),
        None => tracing::debug!(
            vendor_id = format_args!("{vendor_id:04x}"),
            product_id = format_args!("{product_id:04x}"),
            "No matching USB device"
        ),
    }

    Ok(found)
}
