//! Backend selection.

use std::fmt;
use std::path::PathBuf;

use polarsync_protocol::get_serial_device_path;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::acm::AcmTransport;
use crate::error::{Error, Result};
use crate::hid::{HidTransport, UsbHidLink};
use crate::transport::{LinkOptions, NotificationHandler, Transport};
use crate::usb::UsbIdentity;

/// Which backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// HID first, ACM when no HID device is present.
    #[default]
    Auto,
    Hid,
    Acm,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Hid => f.write_str("hid"),
            Self::Acm => f.write_str("acm"),
        }
    }
}

/// Options for [`Device::connect`].
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub backend: Backend,
    /// Serial path of the ACM backend; falls back to the environment, then
    /// `/dev/ttyACM0`.
    pub serial_device: Option<PathBuf>,
    pub link: LinkOptions,
}

impl ConnectOptions {
    #[must_use]
    pub fn serial_path(&self) -> PathBuf {
        self.serial_device
            .clone()
            .unwrap_or_else(get_serial_device_path)
    }
}

#[cfg(unix)]
type SerialTransport = AcmTransport<crate::serial::SerialPort>;

/// A connected device on either backend.
pub enum Device {
    Hid(HidTransport<UsbHidLink>),
    #[cfg(unix)]
    Acm(SerialTransport),
}

impl Device {
    /// Connect using the configured backend.
    pub fn connect(options: &ConnectOptions) -> Result<Self> {
        match options.backend {
            Backend::Hid => Self::connect_hid(options),
            Backend::Acm => Self::connect_acm(options),
            Backend::Auto => match Self::connect_hid(options) {
                Err(Error::DeviceNotFound) => {
                    tracing::debug!("No HID device, trying ACM");
                    Self::connect_acm(options)
                }
                other => other,
            },
        }
    }

    fn connect_hid(options: &ConnectOptions) -> Result<Self> {
        HidTransport::connect(options.link.clone()).map(Self::Hid)
    }

    #[cfg(unix)]
    fn connect_acm(options: &ConnectOptions) -> Result<Self> {
        AcmTransport::connect(&options.serial_path(), options.link.clone()).map(Self::Acm)
    }

    #[cfg(not(unix))]
    fn connect_acm(_options: &ConnectOptions) -> Result<Self> {
        Err(Error::DeviceNotFound)
    }

    #[must_use]
    pub fn backend(&self) -> Backend {
        match self {
            Self::Hid(_) => Backend::Hid,
            #[cfg(unix)]
            Self::Acm(_) => Backend::Acm,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &UsbIdentity {
        match self {
            Self::Hid(t) => t.identity(),
            #[cfg(unix)]
            Self::Acm(t) => t.identity(),
        }
    }

    #[must_use]
    pub fn serial_number(&self) -> Option<&str> {
        self.identity().serial_number.as_deref()
    }
}

impl Transport for Device {
    async fn request_until(&mut self, payload: &[u8], deadline: Instant) -> Result<Vec<u8>> {
        match self {
            Self::Hid(t) => t.request_until(payload, deadline).await,
            #[cfg(unix)]
            Self::Acm(t) => t.request_until(payload, deadline).await,
        }
    }

    async fn read_until(&mut self, deadline: Instant) -> Result<Vec<u8>> {
        match self {
            Self::Hid(t) => t.read_until(deadline).await,
            #[cfg(unix)]
            Self::Acm(t) => t.read_until(deadline).await,
        }
    }

    fn set_notification_handler(&mut self, handler: NotificationHandler) {
        match self {
            Self::Hid(t) => t.set_notification_handler(handler),
            #[cfg(unix)]
            Self::Acm(t) => t.set_notification_handler(handler),
        }
    }

    fn options(&self) -> &LinkOptions {
        match self {
            Self::Hid(t) => t.options(),
            #[cfg(unix)]
            Self::Acm(t) => t.options(),
        }
    }
}
