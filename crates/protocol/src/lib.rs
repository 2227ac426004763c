//! polarsync protocol - framing and message codecs for Polar USB devices.
//!
//! This crate is free of I/O. It provides:
//! - [`hid`]: 64-byte interrupt packet framing with acknowledgements
//! - [`acm`]: flag-framed serial stream decoding
//! - [`DeviceStatus`]: the device status code table
//! - [`Notification`]: unsolicited device events
//! - [`pftp`]: GET requests and directory listings
//! - [`record`]: stored record decoding, including the daily summary
//!
//! # Example
//!
//! ```rust
//! use polarsync_protocol::hid::{HidAssembler, HidEvent, encode_response};
//!
//! let mut assembler = HidAssembler::new();
//! let packets = encode_response(0, b"payload");
//!
//! match assembler.push(&packets[0]).unwrap() {
//!     HidEvent::Complete(message) => assert_eq!(message, b"payload"),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

pub mod acm;
pub mod hid;
pub mod pftp;
pub mod record;

mod error;
mod notification;
mod status;
mod usb;

pub use error::ProtocolError;
pub use notification::{KIND_BATTERY, KIND_PUSH_SETTINGS, Notification, NotificationKind};
pub use pftp::RemoteEntry;
pub use status::DeviceStatus;
pub use usb::{
    ACM_PRODUCT_ID, DEFAULT_SERIAL_DEVICE, HID_PRODUCT_ID, SERIAL_DEVICE_ENV_VAR, VENDOR_ID,
    get_serial_device_path,
};
