//! Decoded frames
//!
//! A [`Frame`] is one decoded unit of device communication. Frames are
//! immutable once constructed; the hex rendering is computed up front so
//! consumers can display it without touching the payload.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameKind {
    /// Snapshot of the display board packet
    Lcd,
    /// Raw power board packet buffer
    PacketBuffer,
    /// A log line streamed by the bridge
    Log,
    /// Command acknowledgment
    Ack,
    /// Anything the decoder could not classify
    Unknown,
}

impl FrameKind {
    /// Short type name used by consumers to request a slot ("lcd", "pb", ...)
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Lcd => "lcd",
            Self::PacketBuffer => "pb",
            Self::Log => "log",
            Self::Ack => "ack",
            Self::Unknown => "unknown",
        }
    }

    /// Resolve a consumer type name back to a kind
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "lcd" => Some(Self::Lcd),
            "pb" => Some(Self::PacketBuffer),
            "log" => Some(Self::Log),
            "ack" => Some(Self::Ack),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lcd => write!(f, "LCD"),
            Self::PacketBuffer => write!(f, "PacketBuffer"),
            Self::Log => write!(f, "Log"),
            Self::Ack => write!(f, "Ack"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One decoded unit of device communication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    kind: FrameKind,
    payload: Vec<u8>,
    raw_hex: String,
}

impl Frame {
    /// Create a frame of the given kind
    pub fn new(kind: FrameKind, payload: impl Into<Vec<u8>>) -> Self {
        let payload = payload.into();
        let raw_hex = hex::encode_upper(&payload);
        Self {
            kind,
            payload,
            raw_hex,
        }
    }

    /// Create an `Unknown` frame carrying bytes that could not be classified
    pub fn unknown(raw: impl Into<Vec<u8>>) -> Self {
        Self::new(FrameKind::Unknown, raw)
    }

    /// Frame kind
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Upper-case hex rendering of the payload
    pub fn raw_hex(&self) -> &str {
        &self.raw_hex
    }

    /// Payload interpreted as text (log lines), with invalid UTF-8 replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload)
            .trim_end_matches(['\r', '\n'])
            .to_string()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FrameKind::Log => write!(f, "[{}] {}", self.kind, self.text()),
            _ => write!(f, "[{}] {}", self.kind, self.raw_hex),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_hex_is_upper_case() {
        let frame = Frame::new(FrameKind::Lcd, vec![0xb0, 0x0a, 0x00]);
        assert_eq!(frame.raw_hex(), "B00A00");
        assert_eq!(frame.payload(), &[0xB0, 0x0A, 0x00]);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(FrameKind::from_type_name("lcd"), Some(FrameKind::Lcd));
        assert_eq!(FrameKind::from_type_name("PB"), Some(FrameKind::PacketBuffer));
        assert_eq!(FrameKind::from_type_name("screen"), None);
        assert_eq!(FrameKind::PacketBuffer.type_name(), "pb");
    }

    #[test]
    fn test_log_text() {
        let frame = Frame::new(FrameKind::Log, b"PB:TX=0B07 (CS=OK)\r\n".to_vec());
        assert_eq!(frame.text(), "PB:TX=0B07 (CS=OK)");
        assert_eq!(frame.to_string(), "[Log] PB:TX=0B07 (CS=OK)");
    }
}
