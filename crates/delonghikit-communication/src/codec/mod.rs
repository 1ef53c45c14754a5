//! Frame codec
//!
//! Translates human command text into wire frames for the bridge, and the
//! bridge's byte stream back into typed [`Frame`](delonghikit_core::Frame)s.

pub mod command_text;
pub mod decoder;
pub mod wire;

pub use command_text::{CommandText, Opcode, Segment};
pub use decoder::{FrameDecoder, Frames, MAX_PENDING};
pub use wire::{frame_checksum, WireFrame, FRAME_START};

use delonghikit_core::CodecError;

/// Encode command text into a complete command frame
///
/// Deterministic: the same text always produces the same bytes. Malformed
/// text fails without producing any output.
pub fn encode(text: &str) -> Result<Vec<u8>, CodecError> {
    encode_command(&CommandText::parse(text)?)
}

/// Encode an already parsed command into a command frame
pub fn encode_command(command: &CommandText) -> Result<Vec<u8>, CodecError> {
    WireFrame::command(command.to_bytes()).encode()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_poll() {
        assert_eq!(encode("p").unwrap(), vec![0xAA, 0x01, b'C', b'p', 0x09]);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let text = "b000000000000000000t3b000000000000000000t8";
        assert_eq!(encode(text).unwrap(), encode(text).unwrap());
    }

    #[test]
    fn test_encode_rejects_bad_hex() {
        assert!(matches!(encode("bZZ"), Err(CodecError::InvalidHex { .. })));
    }
}
