//! Wire frame encoding and parsing
//!
//! Frame format:
//! - START (1 byte): 0xAA synchronization byte
//! - LENGTH (1 byte): payload length (0-255)
//! - TYPE (1 byte): frame type identifier
//! - PAYLOAD (0-255 bytes): type-specific data
//! - CHECKSUM (1 byte): 0x55 + LENGTH + TYPE + all PAYLOAD bytes, mod 256

use delonghikit_core::packet::CHECKSUM_SEED;
use delonghikit_core::{CodecError, FrameKind};

/// Frame synchronization byte
pub const FRAME_START: u8 = 0xAA;

/// Maximum payload size in bytes
pub const MAX_PAYLOAD_SIZE: usize = u8::MAX as usize;

/// START + LENGTH + TYPE + CHECKSUM
pub const FRAME_OVERHEAD: usize = 4;

/// Type byte of a command frame (host to bridge)
pub const TYPE_COMMAND: u8 = b'C';
/// Type byte of a display board packet
pub const TYPE_LCD: u8 = b'L';
/// Type byte of a power board packet
pub const TYPE_PACKET_BUFFER: u8 = b'P';
/// Type byte of a bridge log line
pub const TYPE_LOG: u8 = b'G';
/// Type byte of a command acknowledgment
pub const TYPE_ACK: u8 = b'A';

/// Map a frame kind to its type byte
pub fn type_byte(kind: FrameKind) -> Option<u8> {
    match kind {
        FrameKind::Lcd => Some(TYPE_LCD),
        FrameKind::PacketBuffer => Some(TYPE_PACKET_BUFFER),
        FrameKind::Log => Some(TYPE_LOG),
        FrameKind::Ack => Some(TYPE_ACK),
        FrameKind::Unknown => None,
    }
}

/// Map an inbound type byte to a frame kind
pub fn frame_kind(type_byte: u8) -> Result<FrameKind, CodecError> {
    match type_byte {
        TYPE_LCD => Ok(FrameKind::Lcd),
        TYPE_PACKET_BUFFER => Ok(FrameKind::PacketBuffer),
        TYPE_LOG => Ok(FrameKind::Log),
        TYPE_ACK => Ok(FrameKind::Ack),
        other => Err(CodecError::UnknownFrameKind { type_byte: other }),
    }
}

/// Calculate checksum for frame data
pub fn frame_checksum(length: u8, type_byte: u8, payload: &[u8]) -> u8 {
    payload.iter().fold(
        CHECKSUM_SEED.wrapping_add(length).wrapping_add(type_byte),
        |acc, &byte| acc.wrapping_add(byte),
    )
}

/// Lay out a frame whose payload is known to fit in one length byte
pub(crate) fn write_frame(type_byte: u8, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= MAX_PAYLOAD_SIZE);
    let length = payload.len() as u8;
    let mut out = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    out.push(FRAME_START);
    out.push(length);
    out.push(type_byte);
    out.extend_from_slice(payload);
    out.push(frame_checksum(length, type_byte, payload));
    out
}

/// A frame as it travels on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    /// Frame type identifier
    pub type_byte: u8,
    /// Payload data
    pub payload: Vec<u8>,
}

impl WireFrame {
    /// Create a new frame with the given type and payload
    pub fn new(type_byte: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            type_byte,
            payload: payload.into(),
        }
    }

    /// Create a command frame
    pub fn command(body: impl Into<Vec<u8>>) -> Self {
        Self::new(TYPE_COMMAND, body)
    }

    /// Total size of the encoded frame
    pub fn encoded_len(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }

    /// Encode this frame into bytes
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(CodecError::invalid_hex(
                0,
                format!(
                    "encoded body is {} bytes, frames carry at most {}",
                    self.payload.len(),
                    MAX_PAYLOAD_SIZE
                ),
            ));
        }

        Ok(write_frame(self.type_byte, &self.payload))
    }

    /// Parse one frame from the start of `buf`
    ///
    /// Returns the frame and the number of bytes it occupied.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), CodecError> {
        let Some(&first) = buf.first() else {
            return Err(CodecError::IncompleteFrame {
                needed: FRAME_OVERHEAD,
            });
        };
        if first != FRAME_START {
            return Err(CodecError::MissingStart { found: first });
        }
        if buf.len() < 3 {
            return Err(CodecError::IncompleteFrame {
                needed: FRAME_OVERHEAD - buf.len(),
            });
        }

        let length = buf[1];
        let type_byte = buf[2];
        let total = FRAME_OVERHEAD + length as usize;
        if buf.len() < total {
            return Err(CodecError::IncompleteFrame {
                needed: total - buf.len(),
            });
        }

        let payload = &buf[3..3 + length as usize];
        let actual = buf[total - 1];
        let expected = frame_checksum(length, type_byte, payload);
        if actual != expected {
            return Err(CodecError::ChecksumMismatch { expected, actual });
        }

        Ok((Self::new(type_byte, payload), total))
    }

    /// Classify the frame by its type byte
    pub fn kind(&self) -> Result<FrameKind, CodecError> {
        frame_kind(self.type_byte)
    }
}
