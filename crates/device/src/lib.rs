//! Device access for polarsync.
//!
//! This crate owns the USB side of the tool:
//!
//! - [`Transport`]: one request/response link, implemented by
//!   [`HidTransport`] (64-byte interrupt packets) and [`AcmTransport`]
//!   (flag-framed serial stream)
//! - [`Device`]: picks a backend and connects to it
//! - [`Pftp`]: directory listings and file downloads on top of a transport
//! - [`sync_all`]: mirrors the device tree into a local directory
//!
//! # Example
//!
//! ```no_run
//! use polarsync_device::{ConnectOptions, Device, Pftp, default_sync_root, sync_all};
//!
//! # async fn run() -> polarsync_device::Result<()> {
//! let device = Device::connect(&ConnectOptions::default())?;
//! let root = default_sync_root(device.serial_number());
//! let mut pftp = Pftp::new(device);
//! let report = sync_all(&mut pftp, &root).await?;
//! println!("{} files downloaded", report.downloaded);
//! # Ok(())
//! # }
//! ```

pub mod acm;
pub mod device;
pub mod hid;
pub mod pftp;
#[cfg(unix)]
pub mod serial;
pub mod sync;
pub mod transport;
pub mod usb;

mod error;

#[cfg(test)]
pub(crate) mod testing;

pub use acm::AcmTransport;
pub use device::{Backend, ConnectOptions, Device};
pub use error::{Error, Result};
pub use hid::{HidLink, HidTransport, UsbHidLink};
pub use pftp::{Pftp, download_file, list_directory};
pub use sync::{SyncReport, default_sync_root, sync_all};
pub use transport::{
    CancelFlag, DEFAULT_READ_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, LinkOptions, NotificationHandler,
    Transport,
};
pub use usb::UsbIdentity;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports_accessible() {
        let options = ConnectOptions::default();
        assert_eq!(options.backend, Backend::Auto);
        assert_eq!(options.link.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(options.link.read_timeout, DEFAULT_READ_TIMEOUT);
        assert_eq!(SyncReport::default().downloaded, 0);
    }
}
