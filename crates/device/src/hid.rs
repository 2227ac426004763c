//! HID backend: 64-byte interrupt transfers with per-frame acknowledgement.

use std::time::Duration;

use nusb::transfer::{Queue, RequestBuffer};
use polarsync_protocol::hid::{self, HidAssembler, HidEvent, PACKET_SIZE, Packet};
use polarsync_protocol::{HID_PRODUCT_ID, VENDOR_ID};
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::transport::{LinkOptions, NotificationHandler, Notifier, Transport};
use crate::usb::{self, UsbIdentity};

const INTERFACE: u8 = 0;
const ENDPOINT_OUT: u8 = 0x01;
const ENDPOINT_IN: u8 = 0x81;

/// Packet-level access to a HID device.
#[allow(async_fn_in_trait)]
pub trait HidLink {
    /// Write one 64-byte packet.
    async fn write_packet(&mut self, packet: &Packet, timeout: Duration) -> Result<()>;

    /// Read one packet. `Ok(None)` when nothing arrived within `timeout`.
    async fn read_packet(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

/// [`HidLink`] over a claimed USB interface.
pub struct UsbHidLink {
    interface: nusb::Interface,
    reader: Queue<RequestBuffer>,
}

impl UsbHidLink {
    /// Claim interface 0 of `device`, detaching any kernel driver.
    pub fn open(device: &nusb::DeviceInfo) -> Result<Self> {
        let handle = device.open().map_err(Error::from_usb_open)?;
        let interface = handle
            .detach_and_claim_interface(INTERFACE)
            .map_err(Error::from_usb_open)?;
        let reader = interface.interrupt_in_queue(ENDPOINT_IN);
        Ok(Self { interface, reader })
    }
}

impl HidLink for UsbHidLink {
    async fn write_packet(&mut self, packet: &Packet, timeout: Duration) -> Result<()> {
        let transfer = self.interface.interrupt_out(ENDPOINT_OUT, packet.to_vec());
        match tokio::time::timeout(timeout, transfer).await {
            Ok(completion) => {
                completion.into_result()?;
                Ok(())
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn read_packet(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        // Keep one transfer queued; an elapsed wait leaves it pending.
        if self.reader.pending() == 0 {
            self.reader.submit(RequestBuffer::new(PACKET_SIZE));
        }
        match tokio::time::timeout(timeout, self.reader.next_complete()).await {
            Ok(completion) => Ok(Some(completion.into_result()?)),
            Err(_) => Ok(None),
        }
    }
}

/// Transport over a [`HidLink`].
pub struct HidTransport<L> {
    link: L,
    assembler: HidAssembler,
    notifier: Notifier,
    options: LinkOptions,
    identity: UsbIdentity,
}

impl HidTransport<UsbHidLink> {
    /// Find and claim the HID device.
    pub fn connect(options: LinkOptions) -> Result<Self> {
        let device = usb::find_device(VENDOR_ID, HID_PRODUCT_ID)?.ok_or(Error::DeviceNotFound)?;
        let identity = UsbIdentity::from_device(&device);
        let link = UsbHidLink::open(&device)?;

        tracing::info!(
            product = identity.product.as_deref().unwrap_or("unknown"),
            serial = identity.serial_number.as_deref().unwrap_or("unknown"),
            "Connected over HID"
        );

        Ok(Self::with_identity(link, options, identity))
    }
}

impl<L: HidLink> HidTransport<L> {
    #[must_use]
    pub fn new(link: L, options: LinkOptions) -> Self {
        Self::with_identity(link, options, UsbIdentity::default())
    }

    fn with_identity(link: L, options: LinkOptions, identity: UsbIdentity) -> Self {
        Self {
            link,
            assembler: HidAssembler::new(),
            notifier: Notifier::default(),
            options,
            identity,
        }
    }

    /// Product and serial number read at connect time.
    #[must_use]
    pub fn identity(&self) -> &UsbIdentity {
        &self.identity
    }

    /// Borrow the underlying link.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Write one packet, bounded like a read by the request deadline and
    /// the cancel flag.
    async fn write_until(&mut self, packet: &Packet, deadline: Instant) -> Result<()> {
        let write_deadline = self.options.next_read_deadline(deadline)?;
        let wait = write_deadline.saturating_duration_since(Instant::now());
        self.link.write_packet(packet, wait).await
    }
}

impl<L: HidLink> Transport for HidTransport<L> {
    async fn request_until(&mut self, payload: &[u8], deadline: Instant) -> Result<Vec<u8>> {
        let packet = hid::encode_request(payload)?;
        self.write_until(&packet, deadline).await?;
        self.read_until(deadline).await
    }

    async fn read_until(&mut self, deadline: Instant) -> Result<Vec<u8>> {
        self.assembler.reset();

        loop {
            let read_deadline = self.options.next_read_deadline(deadline)?;
            let wait = read_deadline.saturating_duration_since(Instant::now());
            let Some(packet) = self.link.read_packet(wait).await? else {
                continue;
            };

            match self.assembler.push(&packet)? {
                HidEvent::Notification(notification) => self.notifier.dispatch(&notification),
                HidEvent::Ack(ack) => self.write_until(&ack, deadline).await?,
                HidEvent::Complete(message) => {
                    tracing::debug!(len = message.len(), "HID response complete");
                    return Ok(message);
                }
            }
        }
    }

    fn set_notification_handler(&mut self, handler: NotificationHandler) {
        self.notifier.set_handler(handler);
    }

    fn options(&self) -> &LinkOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedHid;
    use crate::transport::CancelFlag;
    use parking_lot::Mutex;
    use polarsync_protocol::DeviceStatus;
    use polarsync_protocol::hid::{HidFlags, encode_ack, encode_frame, encode_response};
    use std::sync::Arc;

    fn transport(packets: Vec<Packet>) -> HidTransport<ScriptedHid> {
        HidTransport::new(ScriptedHid::new(packets), LinkOptions::default())
    }

    #[tokio::test]
    async fn test_single_frame_request() {
        let mut t = transport(encode_response(0, b"answer"));
        let response = t.request(b"question").await.unwrap();

        assert_eq!(response, b"answer");
        let written = t.link().written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0], hid::encode_request(b"question").unwrap());
    }

    #[tokio::test]
    async fn test_multi_frame_sends_acks() {
        let payload: Vec<u8> = (0..500u32).map(|i| i as u8).collect();
        let packets = encode_response(0, &payload);
        let frames = packets.len();

        let mut t = transport(packets);
        let response = t.request(b"get").await.unwrap();
        assert_eq!(response, payload);

        let written = t.link().written();
        assert_eq!(written.len(), frames);
        for (i, ack) in written[1..].iter().enumerate() {
            assert_eq!(ack, &encode_ack(i as u8));
        }
    }

    #[tokio::test]
    async fn test_notification_is_dispatched_not_returned() {
        let payload = vec![9u8; 130];
        let mut packets = encode_response(0, &payload);
        packets.insert(1, encode_frame(0, HidFlags::NOTIFICATION, &[3, 0, 77]).unwrap());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut t = transport(packets);
        t.set_notification_handler(Box::new(move |n| sink.lock().push(n.payload().to_vec())));

        let response = t.request(b"get").await.unwrap();
        assert_eq!(response, payload);
        assert_eq!(*seen.lock(), vec![vec![3, 0, 77]]);
    }

    #[tokio::test]
    async fn test_device_status_error() {
        let mut t = transport(encode_response(105, b""));
        let err = t.request(b"get").await.unwrap_err();
        assert!(matches!(err, Error::Status(DeviceStatus::FileExists)));
    }

    #[tokio::test]
    async fn test_silent_device_times_out() {
        let mut t = transport(Vec::new());
        let deadline = Instant::now() + Duration::from_millis(30);
        let err = t.request_until(b"get", deadline).await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[tokio::test]
    async fn test_cancelled_before_write() {
        let cancel = CancelFlag::new();
        let options = LinkOptions {
            cancel: cancel.clone(),
            ..LinkOptions::default()
        };
        let mut t = HidTransport::new(ScriptedHid::new(encode_response(0, b"x")), options);
        cancel.cancel();

        let err = t.request(b"get").await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(t.link().written().is_empty());
    }

    #[tokio::test]
    async fn test_expired_deadline_skips_write() {
        let mut t = transport(encode_response(0, b"x"));
        let past = Instant::now() - Duration::from_millis(1);

        let err = t.request_until(b"get", past).await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
        assert!(t.link().written().is_empty());
    }

    #[tokio::test]
    async fn test_writes_bounded_by_request_deadline() {
        let payload = vec![1u8; 200];
        let mut t = transport(encode_response(0, &payload));
        let deadline = Instant::now() + Duration::from_millis(40);

        assert_eq!(t.request_until(b"get", deadline).await.unwrap(), payload);
        let timeouts = t.link().write_timeouts();
        assert!(timeouts.len() > 1);
        assert!(timeouts.iter().all(|&d| d <= Duration::from_millis(40)));
    }

    #[tokio::test]
    async fn test_oversized_request_is_not_sent() {
        let mut t = transport(Vec::new());
        let err = t.request(&[0u8; 60]).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(t.link().written().is_empty());
    }
}
