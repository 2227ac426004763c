//! HID packet framing.
//!
//! Every transfer is a fixed 64-byte interrupt packet:
//!
//! ```text
//! byte 0   packet type (0x01 host -> device, 0x11 device -> host)
//! byte 1   size << 2 | 0x2 notification | 0x1 has more
//! byte 2   packet number
//! byte 3.. body (size - 1 bytes), zero padded to 64
//! ```
//!
//! The first frame of a response opens with two status bytes, and the final
//! frame carries one trailing padding byte. Every frame flagged "has more"
//! must be acknowledged before the device sends the next one.

use bitflags::bitflags;

use crate::error::ProtocolError;
use crate::notification::Notification;
use crate::status::DeviceStatus;

/// Size of every HID packet in both directions.
pub const PACKET_SIZE: usize = 64;

/// Packet type of host to device packets.
pub const REQUEST_TAG: u8 = 0x01;

/// Packet type of device to host packets.
pub const RESPONSE_TAG: u8 = 0x11;

const REQUEST_HEADER_SIZE: usize = 5;
const FRAME_HEADER_SIZE: usize = 3;

/// Largest request payload that fits one packet.
pub const MAX_REQUEST_PAYLOAD: usize = PACKET_SIZE - REQUEST_HEADER_SIZE;

/// Largest frame body a device packet can carry.
pub const MAX_FRAME_BODY: usize = PACKET_SIZE - FRAME_HEADER_SIZE;

/// Default cap on a reassembled message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// One zero-padded HID packet.
pub type Packet = [u8; PACKET_SIZE];

bitflags! {
    /// Flag bits in the low two bits of byte 1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HidFlags: u8 {
        /// More frames follow this one.
        const HAS_MORE = 0x01;
        /// The frame is an unsolicited notification.
        const NOTIFICATION = 0x02;
    }
}

/// Frame an application request into a single packet.
pub fn encode_request(payload: &[u8]) -> Result<Packet, ProtocolError> {
    if payload.len() > MAX_REQUEST_PAYLOAD {
        return Err(ProtocolError::RequestTooLarge {
            len: payload.len(),
            max: MAX_REQUEST_PAYLOAD,
        });
    }

    let mut packet = [0u8; PACKET_SIZE];
    packet[0] = REQUEST_TAG;
    packet[1] = ((payload.len() + 4) << 2) as u8;
    packet[2] = 0;
    packet[3] = payload.len() as u8;
    packet[4] = 0;
    packet[REQUEST_HEADER_SIZE..REQUEST_HEADER_SIZE + payload.len()].copy_from_slice(payload);
    Ok(packet)
}

/// Acknowledge receipt of `packet_number`.
#[must_use]
pub fn encode_ack(packet_number: u8) -> Packet {
    let mut packet = [0u8; PACKET_SIZE];
    packet[0] = REQUEST_TAG;
    packet[1] = (1 << 2) | HidFlags::HAS_MORE.bits();
    packet[2] = packet_number;
    packet
}

/// Frame a device to host packet around `body`.
///
/// This is the device side of the framing; simulators and tests use it to
/// produce packets that [`HidAssembler`] accepts.
pub fn encode_frame(packet_number: u8, flags: HidFlags, body: &[u8]) -> Result<Packet, ProtocolError> {
    if body.len() > MAX_FRAME_BODY {
        return Err(ProtocolError::RequestTooLarge {
            len: body.len(),
            max: MAX_FRAME_BODY,
        });
    }
    Ok(frame_unchecked(packet_number, flags, body))
}

/// Split a response payload into the packets a device would send.
///
/// Packet numbers start at zero and wrap at 256.
#[must_use]
pub fn encode_response(status: u8, payload: &[u8]) -> Vec<Packet> {
    let mut packets = Vec::new();
    let mut rest = payload;
    let mut number: u8 = 0;
    let mut first = true;

    loop {
        let mut body = Vec::with_capacity(MAX_FRAME_BODY);
        if first {
            body.extend_from_slice(&[status, 0]);
            first = false;
        }

        // Final frame needs one byte of room for the trailing pad.
        if rest.len() < MAX_FRAME_BODY - body.len() {
            body.extend_from_slice(rest);
            body.push(0);
            packets.push(frame_unchecked(number, HidFlags::empty(), &body));
            return packets;
        }

        let take = MAX_FRAME_BODY - body.len();
        body.extend_from_slice(&rest[..take]);
        rest = &rest[take..];
        packets.push(frame_unchecked(number, HidFlags::HAS_MORE, &body));
        number = number.wrapping_add(1);
    }
}

fn frame_unchecked(packet_number: u8, flags: HidFlags, body: &[u8]) -> Packet {
    debug_assert!(body.len() <= MAX_FRAME_BODY);
    let mut packet = [0u8; PACKET_SIZE];
    packet[0] = RESPONSE_TAG;
    packet[1] = (((body.len() + 1) << 2) as u8) | flags.bits();
    packet[2] = packet_number;
    packet[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + body.len()].copy_from_slice(body);
    packet
}

/// A parsed device to host packet.
#[derive(Debug, Clone, Copy)]
pub struct HidFrame<'a> {
    /// Flag bits of byte 1.
    pub flags: HidFlags,
    /// Sequence number of this frame.
    pub packet_number: u8,
    /// Bytes covered by the declared size.
    pub body: &'a [u8],
}

impl<'a> HidFrame<'a> {
    /// Parse and validate the header of `packet`.
    pub fn parse(packet: &'a [u8]) -> Result<Self, ProtocolError> {
        if packet.len() < FRAME_HEADER_SIZE {
            return Err(ProtocolError::framing("Packet too short", packet));
        }
        if packet[0] != RESPONSE_TAG {
            return Err(ProtocolError::framing(
                format!("Unknown packet type {}?", packet[0]),
                packet,
            ));
        }

        let size = usize::from(packet[1] >> 2);
        let flags = HidFlags::from_bits_truncate(packet[1]);
        if size == 0 {
            return Err(ProtocolError::framing("Packet declares no payload", packet));
        }

        let end = 2 + size;
        if end > packet.len() {
            return Err(ProtocolError::framing(
                format!("Declared size {size} exceeds the {} byte packet", packet.len()),
                packet,
            ));
        }

        Ok(Self {
            flags,
            packet_number: packet[2],
            body: &packet[FRAME_HEADER_SIZE..end],
        })
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.flags.contains(HidFlags::HAS_MORE)
    }

    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.flags.contains(HidFlags::NOTIFICATION)
    }
}

/// What the transport must do after feeding one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HidEvent {
    /// A notification arrived; the response is still pending.
    Notification(Notification),
    /// Send this acknowledgement, then read the next packet.
    Ack(Packet),
    /// The response is complete.
    Complete(Vec<u8>),
}

/// Reassembles one response message from HID packets.
#[derive(Debug)]
pub struct HidAssembler {
    expected: u8,
    initial: bool,
    message: Vec<u8>,
    max_message_size: usize,
}

impl HidAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    #[must_use]
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            expected: 0,
            initial: true,
            message: Vec::new(),
            max_message_size,
        }
    }

    /// Forget any partially assembled message.
    pub fn reset(&mut self) {
        self.expected = 0;
        self.initial = true;
        self.message.clear();
    }

    /// Feed one packet read from the device.
    ///
    /// Any error leaves the assembler reset for the next request.
    pub fn push(&mut self, packet: &[u8]) -> Result<HidEvent, ProtocolError> {
        let result = self.push_inner(packet);
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn push_inner(&mut self, packet: &[u8]) -> Result<HidEvent, ProtocolError> {
        let frame = HidFrame::parse(packet)?;

        if frame.is_notification() {
            return Ok(HidEvent::Notification(Notification::new(frame.body.to_vec())));
        }

        let mut body = frame.body;
        if self.initial {
            if body.len() < 2 {
                return Err(ProtocolError::framing(
                    "Initial packet too short for status bytes",
                    packet,
                ));
            }
            DeviceStatus::check(body[0])?;
            body = &body[2..];
            self.initial = false;
        }

        if frame.packet_number != self.expected {
            return Err(ProtocolError::framing(
                format!(
                    "Expecting packet number {}, got {}",
                    self.expected, frame.packet_number
                ),
                packet,
            ));
        }

        if !frame.has_more() {
            // Final packet carries one trailing padding byte.
            body = match body.split_last() {
                Some((_, payload)) => payload,
                None => {
                    return Err(ProtocolError::framing(
                        "Final packet lacks its padding byte",
                        packet,
                    ));
                }
            };
        }

        if self.message.len() + body.len() > self.max_message_size {
            return Err(ProtocolError::framing(
                format!(
                    "Buffer overflow: message exceeds {} bytes",
                    self.max_message_size
                ),
                packet,
            ));
        }
        self.message.extend_from_slice(body);

        tracing::trace!(
            packet_number = frame.packet_number,
            len = body.len(),
            has_more = frame.has_more(),
            "HID frame"
        );

        if frame.has_more() {
            self.expected = self.expected.wrapping_add(1);
            return Ok(HidEvent::Ack(encode_ack(frame.packet_number)));
        }

        let message = std::mem::take(&mut self.message);
        self.reset();
        Ok(HidEvent::Complete(message))
    }
}

impl Default for HidAssembler {
    fn default() -> Self {
        Self::new()
    }
}
