//! Error types for device communication.

use std::io;
use std::path::PathBuf;

use polarsync_protocol::{DeviceStatus, ProtocolError};
use thiserror::Error;

/// Main error type for all device operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No device with the expected vendor/product ID is connected.
    #[error("Could not find Polar USB device")]
    DeviceNotFound,

    /// The device is present but another driver or process holds it.
    #[error("Polar USB device is busy")]
    Busy,

    /// The device is present but we lack permission to open it.
    #[error("No permission to access Polar USB device")]
    AccessDenied,

    /// The ACM device is present but its serial endpoint failed to open.
    #[error(
        "Couldn't open Polar USB device on {}: {source} (use --serial-device to pick another path)",
        .path.display()
    )]
    SerialOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The device answered with a non-success status code.
    #[error("Error: {0}")]
    Status(DeviceStatus),

    /// Framing or decoding failed.
    #[error("Protocol error: {0}")]
    Protocol(ProtocolError),

    /// A USB transfer failed.
    #[error("USB transfer failed: {0}")]
    Transfer(#[from] nusb::transfer::TransferError),

    /// The request did not complete before its deadline.
    #[error("Timed out waiting for the device")]
    Timeout,

    /// The request was cancelled between two frame reads.
    #[error("Request cancelled")]
    Cancelled,

    /// I/O error on the link or the local filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Device(status) => Self::Status(status),
            other => Self::Protocol(other),
        }
    }
}

impl From<DeviceStatus> for Error {
    fn from(status: DeviceStatus) -> Self {
        Self::Status(status)
    }
}

impl Error {
    /// Map an error from opening or claiming a USB device.
    pub(crate) fn from_usb_open(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::PermissionDenied {
            return Self::AccessDenied;
        }
        if err.raw_os_error() == Some(libc::EBUSY) {
            return Self::Busy;
        }
        match err.kind() {
            io::ErrorKind::NotFound => Self::DeviceNotFound,
            _ => Self::Io(err),
        }
    }

    /// Whether the device reported that a path does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status(DeviceStatus::NoSuchFileOrDirectory))
    }

    /// Whether the link may be left mid-message by this error.
    ///
    /// Anything that interrupts framing leaves unknown bytes on the link;
    /// further requests on the same connection are not trustworthy.
    #[must_use]
    pub fn is_link_fatal(&self) -> bool {
        matches!(
            self,
            Self::Protocol(ProtocolError::Framing { .. })
                | Self::Transfer(_)
                | Self::Timeout
                | Self::Cancelled
        )
    }
}

/// Result type alias using the device [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
