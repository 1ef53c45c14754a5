//! Device state aggregate
//!
//! [`DeviceState`] is the latest decoded picture of the appliance. Only the
//! [`StateStore`](super::StateStore) mutates it; everyone else receives
//! snapshots.

use crate::frame::{Frame, FrameKind};
use crate::packet;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Per-board count of packets rejected for a bad checksum
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumErrors {
    /// Display board packets with a bad checksum
    pub lcd: u32,
    /// Power board packets with a bad checksum
    pub packet_buffer: u32,
}

/// Latest decoded device state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Latest display board packet
    pub lcd: Option<Frame>,
    /// Latest power board packet
    pub packet_buffer: Option<Frame>,
    /// Log history, oldest first
    pub log: VecDeque<Frame>,
    /// Log frames applied so far, including ones trimmed from history
    pub log_total: u64,
    /// Latest command acknowledgment
    pub last_ack: Option<Frame>,
    /// Latest frame the decoder could not classify
    pub last_unknown: Option<Frame>,
    /// Packets rejected for a bad checksum
    pub checksum_errors: ChecksumErrors,
    /// Incremented on every applied frame. Not protocol relevant.
    pub render_counter: u64,
}

impl DeviceState {
    /// Latest frame for a slot
    ///
    /// For `Log` this is the most recent log entry.
    pub fn frame(&self, kind: FrameKind) -> Option<&Frame> {
        match kind {
            FrameKind::Lcd => self.lcd.as_ref(),
            FrameKind::PacketBuffer => self.packet_buffer.as_ref(),
            FrameKind::Log => self.log.back(),
            FrameKind::Ack => self.last_ack.as_ref(),
            FrameKind::Unknown => self.last_unknown.as_ref(),
        }
    }

    /// Log lines as text, oldest first
    pub fn log_lines(&self) -> Vec<String> {
        self.log.iter().map(Frame::text).collect()
    }

    /// Update the slot matching the frame kind
    pub(crate) fn apply(&mut self, frame: Frame, max_log_entries: Option<usize>) {
        self.render_counter = self.render_counter.wrapping_add(1);

        match frame.kind() {
            FrameKind::Lcd => {
                if packet::checksum_ok(frame.payload()) {
                    self.lcd = Some(frame);
                } else {
                    self.checksum_errors.lcd += 1;
                    tracing::warn!(
                        "LCD packet checksum mismatch: expected 0x{:02X} in {}",
                        packet::checksum(frame.payload()),
                        frame.raw_hex()
                    );
                }
            }
            FrameKind::PacketBuffer => {
                if packet::checksum_ok(frame.payload()) {
                    self.packet_buffer = Some(frame);
                } else {
                    self.checksum_errors.packet_buffer += 1;
                    tracing::warn!(
                        "PB packet checksum mismatch: expected 0x{:02X} in {}",
                        packet::checksum(frame.payload()),
                        frame.raw_hex()
                    );
                }
            }
            FrameKind::Log => {
                self.log_total += 1;
                self.log.push_back(frame);
                if let Some(max) = max_log_entries {
                    while self.log.len() > max {
                        self.log.pop_front();
                    }
                }
            }
            FrameKind::Ack => self.last_ack = Some(frame),
            FrameKind::Unknown => self.last_unknown = Some(frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pb_frame() -> Frame {
        Frame::new(
            FrameKind::PacketBuffer,
            vec![0x0B, 0x07, 0x00, 0x28, 0x0F, 0x20, 0x04, 0x00, 0xC2],
        )
    }

    #[test]
    fn test_packet_slot_replaced() {
        let mut state = DeviceState::default();
        state.apply(pb_frame(), None);
        assert_eq!(state.packet_buffer, Some(pb_frame()));
        assert_eq!(state.render_counter, 1);
        assert!(state.lcd.is_none());
    }

    #[test]
    fn test_bad_checksum_counted_not_stored() {
        let mut state = DeviceState::default();
        state.apply(
            Frame::new(FrameKind::Lcd, vec![0xB0, 0x01, 0x02, 0x00]),
            None,
        );
        assert!(state.lcd.is_none());
        assert_eq!(state.checksum_errors.lcd, 1);
        assert_eq!(state.render_counter, 1);
    }

    #[test]
    fn test_log_bounded() {
        let mut state = DeviceState::default();
        for i in 0..5u8 {
            state.apply(Frame::new(FrameKind::Log, vec![b'0' + i]), Some(3));
        }
        assert_eq!(state.log_lines(), vec!["2", "3", "4"]);
        assert_eq!(state.log_total, 5);
        assert_eq!(state.frame(FrameKind::Log).map(Frame::text), Some("4".to_string()));
    }
}
