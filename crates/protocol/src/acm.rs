//! CDC-ACM stream framing.
//!
//! The serial link carries variable-length frames:
//!
//! ```text
//! byte 0   flags: bit0 initial, bit1 notification, bit2 reserved (set), bit3 has more
//! byte 1   payload length, low byte
//! byte 2   payload length, high byte
//! byte 3.. payload
//! ```
//!
//! A header whose flag byte is exactly `1` is a status frame; its payload
//! is a device status code. Reads may split or merge frames arbitrarily, so
//! [`AcmDecoder`] buffers bytes and parses incrementally. The decoded result
//! does not depend on where the reads split the stream.

use bitflags::bitflags;
use bytes::{Buf, BytesMut};

use crate::error::ProtocolError;
use crate::notification::Notification;
use crate::status::DeviceStatus;

/// Header length of every frame.
pub const HEADER_SIZE: usize = 3;

/// Flag byte of host to device requests: initial + reserved.
pub const REQUEST_TAG: u8 = 5;

/// Flag byte of a status frame.
pub const STATUS_TAG: u8 = 1;

/// Control frame asking the device for the next continuation frame.
pub const REQUEST_MORE: [u8; HEADER_SIZE] = [8, 0, 0];

/// Largest payload a single frame can declare.
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// Default cap on a reassembled message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

bitflags! {
    /// Flag bits of header byte 0.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AcmFlags: u8 {
        /// First frame of a message.
        const INITIAL = 0x01;
        /// Frame belongs to a notification.
        const NOTIFICATION = 0x02;
        /// Always set by the device.
        const RESERVED = 0x04;
        /// Another frame of the same message follows.
        const HAS_MORE = 0x08;
    }
}

/// Frame an application request.
pub fn encode_request(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    encode_frame(AcmFlags::INITIAL | AcmFlags::RESERVED, payload)
}

/// Frame `payload` under an arbitrary flag set.
///
/// Requests use [`encode_request`]; this exists for simulators and tests
/// that play the device side.
pub fn encode_frame(flags: AcmFlags, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = u16::try_from(payload.len()).map_err(|_| ProtocolError::RequestTooLarge {
        len: payload.len(),
        max: MAX_FRAME_PAYLOAD,
    })?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.push(flags.bits());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// A parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcmHeader {
    pub flags: AcmFlags,
    pub len: usize,
}

impl AcmHeader {
    /// Parse and validate a 3-byte header.
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Result<Self, ProtocolError> {
        let len = usize::from(u16::from_le_bytes([bytes[1], bytes[2]]));

        if bytes[0] == STATUS_TAG {
            return Ok(Self {
                flags: AcmFlags::INITIAL,
                len,
            });
        }

        let Some(flags) = AcmFlags::from_bits(bytes[0]) else {
            return Err(ProtocolError::framing(
                format!("Unknown packet type {}?", bytes[0]),
                bytes,
            ));
        };
        if !flags.contains(AcmFlags::RESERVED) {
            return Err(ProtocolError::framing(
                format!("Reserved bit missing in packet type {}", bytes[0]),
                bytes,
            ));
        }

        Ok(Self { flags, len })
    }

    /// Whether this header opens a status frame.
    #[must_use]
    pub fn is_status(&self) -> bool {
        !self.flags.contains(AcmFlags::RESERVED)
    }
}

/// Something the transport must act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcmEvent {
    /// A frame flagged "has more" completed; write [`REQUEST_MORE`].
    RequestMore,
    /// A notification message completed.
    Notification(Notification),
    /// The response message completed.
    Response(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Response,
    Notification,
    Status,
}

#[derive(Debug, Clone, Copy)]
struct FrameInProgress {
    target: Target,
    remaining: usize,
    has_more: bool,
}

/// Incremental decoder for the ACM byte stream.
#[derive(Debug)]
pub struct AcmDecoder {
    pending: BytesMut,
    frame: Option<FrameInProgress>,
    response: Option<Vec<u8>>,
    notification: Option<Vec<u8>>,
    status: Vec<u8>,
    response_done: bool,
    max_message_size: usize,
}

impl AcmDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    #[must_use]
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            pending: BytesMut::with_capacity(64 * 1024),
            frame: None,
            response: None,
            notification: None,
            status: Vec::new(),
            response_done: false,
            max_message_size,
        }
    }

    /// Prepare for the response to a new request.
    ///
    /// Bytes already buffered from the link are kept.
    pub fn begin_response(&mut self) {
        self.response_done = false;
    }

    /// Drop all state, including buffered bytes.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.frame = None;
        self.response = None;
        self.notification = None;
        self.status.clear();
        self.response_done = false;
    }

    /// Append bytes read from the link.
    pub fn push(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Number of buffered, not yet parsed bytes.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Drop the response in progress, keeping buffered bytes and any
    /// notification being assembled.
    pub fn abort_response(&mut self) {
        if self.frame.is_some_and(|f| f.target != Target::Notification) {
            self.frame = None;
        }
        self.response = None;
        self.status.clear();
        self.response_done = false;
    }

    /// Parse buffered bytes until an event is ready.
    ///
    /// Returns `Ok(None)` when more bytes are needed. A device status error
    /// ends the response but keeps the bytes that follow it; any other error
    /// clears the decoder.
    pub fn next_event(&mut self) -> Result<Option<AcmEvent>, ProtocolError> {
        let result = self.next_event_inner();
        match &result {
            Err(ProtocolError::Device(_)) => self.abort_response(),
            Err(_) => self.clear(),
            Ok(_) => {}
        }
        result
    }

    fn next_event_inner(&mut self) -> Result<Option<AcmEvent>, ProtocolError> {
        loop {
            let Some(mut frame) = self.frame else {
                if self.pending.len() < HEADER_SIZE {
                    return Ok(None);
                }
                let header_bytes = [self.pending[0], self.pending[1], self.pending[2]];
                let header = AcmHeader::parse(&header_bytes)?;
                self.open_frame(header, &header_bytes)?;
                self.pending.advance(HEADER_SIZE);
                continue;
            };

            let take = frame.remaining.min(self.pending.len());
            if take > 0 {
                let chunk = self.pending.split_to(take);
                self.buffer_for(frame.target).extend_from_slice(&chunk);
                frame.remaining -= take;
            }

            if frame.remaining > 0 {
                self.frame = Some(frame);
                return Ok(None);
            }

            self.frame = None;
            if let Some(event) = self.finish_frame(frame)? {
                return Ok(Some(event));
            }
        }
    }

    fn open_frame(&mut self, header: AcmHeader, raw: &[u8]) -> Result<(), ProtocolError> {
        let target = if header.is_status() {
            Target::Status
        } else if header.flags.contains(AcmFlags::NOTIFICATION) {
            Target::Notification
        } else {
            Target::Response
        };

        let initial = header.flags.contains(AcmFlags::INITIAL);
        let max = self.max_message_size;
        let response_done = self.response_done;

        let stream = match target {
            Target::Status => {
                self.status.clear();
                self.frame = Some(FrameInProgress {
                    target,
                    remaining: header.len,
                    has_more: false,
                });
                return Ok(());
            }
            Target::Response => &mut self.response,
            Target::Notification => &mut self.notification,
        };

        if initial {
            if stream.is_some() {
                return Err(ProtocolError::framing(
                    "Initial packet received while a message is in progress",
                    raw,
                ));
            }
            if target == Target::Response && response_done {
                return Err(ProtocolError::framing(
                    "Response data received after the response completed",
                    raw,
                ));
            }
            *stream = Some(Vec::new());
        } else if stream.is_none() {
            return Err(ProtocolError::framing(
                "Continuation packet received before an initial packet",
                raw,
            ));
        }

        let received = stream.as_ref().map_or(0, Vec::len);
        if received + header.len > max {
            return Err(ProtocolError::framing(
                format!("Buffer overflow: message exceeds {max} bytes"),
                raw,
            ));
        }

        tracing::trace!(?target, len = header.len, flags = ?header.flags, "ACM frame");

        self.frame = Some(FrameInProgress {
            target,
            remaining: header.len,
            has_more: header.flags.contains(AcmFlags::HAS_MORE),
        });
        Ok(())
    }

    fn buffer_for(&mut self, target: Target) -> &mut Vec<u8> {
        match target {
            Target::Status => &mut self.status,
            Target::Response => self.response.get_or_insert_with(Vec::new),
            Target::Notification => self.notification.get_or_insert_with(Vec::new),
        }
    }

    fn finish_frame(&mut self, frame: FrameInProgress) -> Result<Option<AcmEvent>, ProtocolError> {
        match frame.target {
            Target::Status => {
                let code = self.status.first().copied().unwrap_or(0);
                self.status.clear();
                DeviceStatus::check(code)?;
                Ok(None)
            }
            _ if frame.has_more => Ok(Some(AcmEvent::RequestMore)),
            Target::Notification => {
                let payload = self.notification.take().unwrap_or_default();
                Ok(Some(AcmEvent::Notification(Notification::new(payload))))
            }
            Target::Response => {
                let payload = self.response.take().unwrap_or_default();
                self.response_done = true;
                Ok(Some(AcmEvent::Response(payload)))
            }
        }
    }
}

impl Default for AcmDecoder {
    fn default() -> Self {
        Self::new()
    }
}
