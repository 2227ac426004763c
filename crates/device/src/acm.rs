//! ACM backend: flag-framed byte stream over a serial port.

use std::path::{Path, PathBuf};
use std::time::Duration;

use polarsync_protocol::acm::{self, AcmDecoder, AcmEvent, REQUEST_MORE};
use polarsync_protocol::{ACM_PRODUCT_ID, VENDOR_ID};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::transport::{LinkOptions, NotificationHandler, Notifier, Transport};
use crate::usb::{self, UsbIdentity};

/// Back-off after a read that returned no bytes.
pub const EMPTY_READ_BACKOFF: Duration = Duration::from_millis(100);

const READ_CHUNK: usize = 64 * 1024;

/// Transport over any byte stream speaking the ACM framing.
pub struct AcmTransport<S> {
    port: S,
    decoder: AcmDecoder,
    notifier: Notifier,
    options: LinkOptions,
    identity: UsbIdentity,
    chunk: Vec<u8>,
}

#[cfg(unix)]
impl AcmTransport<crate::serial::SerialPort> {
    /// Find the ACM device over USB and open its serial endpoint.
    pub fn connect(serial_path: &Path, options: LinkOptions) -> Result<Self> {
        let device = usb::find_device(VENDOR_ID, ACM_PRODUCT_ID)?.ok_or(Error::DeviceNotFound)?;
        let identity = UsbIdentity::from_device(&device);

        let port = crate::serial::SerialPort::open(serial_path).map_err(|source| {
            Error::SerialOpen {
                path: PathBuf::from(serial_path),
                source,
            }
        })?;

        tracing::info!(
            product = identity.product.as_deref().unwrap_or("unknown"),
            serial = identity.serial_number.as_deref().unwrap_or("unknown"),
            path = %serial_path.display(),
            "Connected over ACM"
        );

        Ok(Self::with_identity(port, options, identity))
    }
}

impl<S> AcmTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    #[must_use]
    pub fn new(port: S, options: LinkOptions) -> Self {
        Self::with_identity(port, options, UsbIdentity::default())
    }

    fn with_identity(port: S, options: LinkOptions, identity: UsbIdentity) -> Self {
        Self {
            port,
            decoder: AcmDecoder::new(),
            notifier: Notifier::default(),
            options,
            identity,
            chunk: vec![0u8; READ_CHUNK],
        }
    }

    /// Product and serial number read at connect time.
    #[must_use]
    pub fn identity(&self) -> &UsbIdentity {
        &self.identity
    }

    /// Borrow the underlying stream.
    pub fn port(&self) -> &S {
        &self.port
    }

    async fn write_frame(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes).await?;
        self.port.flush().await?;
        Ok(())
    }

    /// Read one chunk into the decoder. Returns the number of bytes read.
    async fn fill(&mut self, deadline: Instant) -> Result<usize> {
        let read_deadline = self.options.next_read_deadline(deadline)?;
        let read = tokio::time::timeout_at(read_deadline, self.port.read(&mut self.chunk)).await;
        let n = match read {
            Ok(result) => result?,
            Err(_elapsed) => return Ok(0),
        };

        if n == 0 {
            // Nothing available; avoid spinning on an idle link.
            let now = Instant::now();
            tokio::time::sleep_until(deadline.min(now + EMPTY_READ_BACKOFF)).await;
            return Ok(0);
        }

        tracing::trace!(len = n, "ACM read");
        self.decoder.push(&self.chunk[..n]);
        Ok(n)
    }

    async fn read_response(&mut self, deadline: Instant) -> Result<Vec<u8>> {
        self.decoder.begin_response();

        loop {
            while let Some(event) = self.decoder.next_event()? {
                match event {
                    AcmEvent::RequestMore => self.write_frame(&REQUEST_MORE).await?,
                    AcmEvent::Notification(notification) => {
                        self.notifier.dispatch(&notification);
                    }
                    AcmEvent::Response(message) => {
                        tracing::debug!(
                            len = message.len(),
                            buffered = self.decoder.buffered(),
                            "ACM response complete"
                        );
                        return Ok(message);
                    }
                }
            }

            self.fill(deadline).await?;
        }
    }

    /// A failed exchange must not leak a half-read frame into the next one.
    /// Device status errors already ended the response cleanly.
    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if !matches!(err, Error::Status(_)) {
                tracing::debug!(
                    error = %err,
                    buffered = self.decoder.buffered(),
                    "Discarding ACM stream state"
                );
                self.decoder.clear();
            }
        }
        result
    }
}

impl<S> Transport for AcmTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn request_until(&mut self, payload: &[u8], deadline: Instant) -> Result<Vec<u8>> {
        let framed = acm::encode_request(payload)?;
        let result = match self.write_frame(&framed).await {
            Ok(()) => self.read_response(deadline).await,
            Err(err) => Err(err),
        };
        self.settle(result)
    }

    async fn read_until(&mut self, deadline: Instant) -> Result<Vec<u8>> {
        let result = self.read_response(deadline).await;
        self.settle(result)
    }

    fn set_notification_handler(&mut self, handler: NotificationHandler) {
        self.notifier.set_handler(handler);
    }

    fn options(&self) -> &LinkOptions {
        &self.options
    }
}
