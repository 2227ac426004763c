//! Error type for protocol operations.

use std::fmt;

use thiserror::Error;

use crate::status::DeviceStatus;

/// Error type for framing, decoding and status handling.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A framing invariant was violated. Carries the offending raw bytes.
    #[error("{reason}\nPACKET: {}", HexBytes(.frame))]
    Framing {
        /// What went wrong.
        reason: String,
        /// The frame (or buffered bytes) that triggered the violation.
        frame: Vec<u8>,
    },

    /// The device reported a non-success status code.
    #[error("device error: {0}")]
    Device(#[from] DeviceStatus),

    /// The request does not fit the transport's outbound framing.
    #[error("request payload of {len} bytes exceeds the {max} byte limit")]
    RequestTooLarge {
        /// Payload length that was requested.
        len: usize,
        /// Largest payload the framing can carry.
        max: usize,
    },

    /// Protobuf decoding failed.
    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// IO error while decompressing a record.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub(crate) fn framing(reason: impl Into<String>, frame: &[u8]) -> Self {
        Self::Framing {
            reason: reason.into(),
            frame: frame.to_vec(),
        }
    }
}

struct HexBytes<'a>(&'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_error_shows_packet() {
        let err = ProtocolError::framing("Unknown packet type 0x12", &[0x12, 0x0a, 0xff]);
        assert_eq!(err.to_string(), "Unknown packet type 0x12\nPACKET: 12 a ff");
    }

    #[test]
    fn test_device_status_converts() {
        let err: ProtocolError = DeviceStatus::DiskFull.into();
        assert!(matches!(err, ProtocolError::Device(DeviceStatus::DiskFull)));
    }
}
