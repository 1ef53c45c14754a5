//! Appliance packet model
//!
//! The bridge sits between the display board (LCD) and the power board (PB)
//! and relays fixed-size packets between them. Every packet carries an
//! additive checksum in its last byte: `0x55 + sum(bytes[..n-1])`, mod 256.
//!
//! Packet size depends on the protocol generation:
//! - V1: 9 bytes
//! - V2: 11 bytes (default; V2 buffers also work on V1 boards)

use crate::frame::{Frame, FrameKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// First byte of a packet sent by the display board
pub const LCD_PACKET_START: u8 = 0xB0;

/// First byte of a packet sent by the power board
pub const PB_PACKET_START: u8 = 0x0B;

/// Seed added to the byte sum when computing a packet checksum
pub const CHECKSUM_SEED: u8 = 0x55;

/// Protocol generation of the appliance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    /// First generation, 9-byte packets
    V1,
    /// Second generation, 11-byte packets
    #[default]
    V2,
}

impl ProtocolVersion {
    /// Packet size in bytes, including the checksum byte
    pub fn packet_size(&self) -> usize {
        match self {
            Self::V1 => 9,
            Self::V2 => 11,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1 => write!(f, "v1"),
            Self::V2 => write!(f, "v2"),
        }
    }
}

impl std::str::FromStr for ProtocolVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "v1" => Ok(Self::V1),
            "2" | "v2" => Ok(Self::V2),
            other => Err(format!("unknown protocol version '{}'", other)),
        }
    }
}

/// Compute the checksum over all but the last byte of a packet
pub fn checksum(packet: &[u8]) -> u8 {
    let body = &packet[..packet.len().saturating_sub(1)];
    body.iter()
        .fold(CHECKSUM_SEED, |acc, &byte| acc.wrapping_add(byte))
}

/// Check the trailing checksum byte of a packet
pub fn checksum_ok(packet: &[u8]) -> bool {
    match packet.last() {
        Some(&last) => checksum(packet) == last,
        None => false,
    }
}

/// A typed view over an LCD or power board packet frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePacket<'a> {
    source: FrameKind,
    bytes: &'a [u8],
}

impl<'a> DevicePacket<'a> {
    /// View a frame as a device packet
    ///
    /// Returns `None` for frames that do not carry appliance packets.
    pub fn from_frame(frame: &'a Frame) -> Option<Self> {
        match frame.kind() {
            FrameKind::Lcd | FrameKind::PacketBuffer => Some(Self {
                source: frame.kind(),
                bytes: frame.payload(),
            }),
            _ => None,
        }
    }

    /// Which board the packet came from
    pub fn source(&self) -> FrameKind {
        self.source
    }

    /// Raw packet bytes
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Whether the trailing checksum byte matches
    pub fn checksum_ok(&self) -> bool {
        checksum_ok(self.bytes)
    }

    /// Whether the start byte matches the board the packet claims to come from
    pub fn start_byte_ok(&self) -> bool {
        let expected = match self.source {
            FrameKind::Lcd => LCD_PACKET_START,
            _ => PB_PACKET_START,
        };
        self.bytes.first() == Some(&expected)
    }

    /// Data bytes between the start byte and the checksum
    pub fn data(&self) -> &'a [u8] {
        if self.bytes.len() < 2 {
            return &[];
        }
        &self.bytes[1..self.bytes.len() - 1]
    }
}
