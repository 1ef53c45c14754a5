//! Streaming frame decoder
//!
//! Bytes from the transport arrive in arbitrary chunks. The decoder buffers
//! them and yields complete frames in arrival order. Nothing is dropped:
//! junk before a frame start, frames with a bad checksum and frames with an
//! unrecognized type all come out as [`FrameKind::Unknown`].
//!
//! Junk and corrupt frames are reported once the next frame start has been
//! seen (or on [`FrameDecoder::flush`]), so the frames produced do not depend
//! on how the input was split into chunks. Held junk is capped at
//! [`MAX_PENDING`] bytes; past that it is reported without waiting.

use delonghikit_core::{CodecError, Frame, FrameKind, ProtocolVersion};

use super::wire::{WireFrame, FRAME_OVERHEAD, FRAME_START, MAX_PAYLOAD_SIZE};

/// Most bytes held while waiting for a frame start
pub const MAX_PENDING: usize = 2 * (FRAME_OVERHEAD + MAX_PAYLOAD_SIZE);

/// Stateful decoder turning a byte stream into frames
#[derive(Debug, Clone, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    version: ProtocolVersion,
}

impl FrameDecoder {
    /// Create a decoder for the given protocol version
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            buffer: Vec::new(),
            version,
        }
    }

    /// Protocol version used to validate packet lengths
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Number of buffered bytes not yet part of a yielded frame
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop all buffered bytes
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Buffer `bytes` and iterate over the frames now complete
    ///
    /// Frames not pulled from the iterator stay buffered for the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Frames<'_> {
        self.buffer.extend_from_slice(bytes);
        Frames { decoder: self }
    }

    /// Yield any buffered partial frame as `Unknown`
    pub fn flush(&mut self) -> Option<Frame> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        tracing::debug!("Flushing {} buffered bytes as unknown frame", rest.len());
        Some(Frame::unknown(rest))
    }

    fn next_frame(&mut self) -> Option<Frame> {
        let first = *self.buffer.first()?;

        if first != FRAME_START {
            return match self.next_start(0) {
                Some(end) => Some(self.take_junk(end, "bytes before frame start")),
                None => self.take_overflow(),
            };
        }

        match WireFrame::parse(&self.buffer) {
            Ok((wire, consumed)) => {
                self.buffer.drain(..consumed);
                Some(self.classify(wire))
            }
            Err(CodecError::IncompleteFrame { .. }) => None,
            Err(err) => match self.next_start(1) {
                Some(end) => Some(self.take_junk(end, &err.to_string())),
                None => self.take_overflow(),
            },
        }
    }

    /// Report everything held once it outgrows [`MAX_PENDING`]
    fn take_overflow(&mut self) -> Option<Frame> {
        if self.buffer.len() <= MAX_PENDING {
            return None;
        }
        let end = self.buffer.len();
        Some(self.take_junk(end, "no frame start within pending limit"))
    }

    /// Index of the first frame start at or after `from`
    fn next_start(&self, from: usize) -> Option<usize> {
        self.buffer
            .iter()
            .skip(from)
            .position(|&b| b == FRAME_START)
            .map(|pos| pos + from)
    }

    fn take_junk(&mut self, end: usize, reason: &str) -> Frame {
        let junk: Vec<u8> = self.buffer.drain(..end).collect();
        let frame = Frame::unknown(junk);
        tracing::warn!("Discarding {} ({})", frame.raw_hex(), reason);
        frame
    }

    fn classify(&self, wire: WireFrame) -> Frame {
        let kind = match wire.kind() {
            Ok(kind) => kind,
            Err(err) => {
                tracing::warn!("{}: payload {}", err, hex::encode_upper(&wire.payload));
                return Frame::unknown(wire.payload);
            }
        };

        if matches!(kind, FrameKind::Lcd | FrameKind::PacketBuffer)
            && wire.payload.len() != self.version.packet_size()
        {
            tracing::warn!(
                "{} packet of {} bytes does not match protocol {} ({} bytes)",
                kind,
                wire.payload.len(),
                self.version,
                self.version.packet_size()
            );
            return Frame::unknown(wire.payload);
        }

        Frame::new(kind, wire.payload)
    }
}

/// Iterator over frames completed by a [`FrameDecoder::feed`] call
#[derive(Debug)]
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.decoder.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::wire::{TYPE_ACK, TYPE_LCD, TYPE_LOG};
    use delonghikit_core::packet;

    fn encode(type_byte: u8, payload: &[u8]) -> Vec<u8> {
        WireFrame::new(type_byte, payload.to_vec()).encode().unwrap()
    }

    fn lcd_packet() -> Vec<u8> {
        let mut bytes = vec![0xB0, 0x00, 0x80, 0x0A, 0x13, 0x03, 0x27, 0xF0, 0x75, 0x00, 0x00];
        let last = bytes.len() - 1;
        bytes[last] = packet::checksum(&bytes);
        bytes
    }

    #[test]
    fn test_several_frames_in_one_delivery() {
        let mut bytes = encode(TYPE_LOG, b"Init'd");
        bytes.extend(encode(TYPE_ACK, b"p"));

        let mut decoder = FrameDecoder::default();
        let frames: Vec<Frame> = decoder.feed(&bytes).collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].kind(), FrameKind::Log);
        assert_eq!(frames[0].text(), "Init'd");
        assert_eq!(frames[1].kind(), FrameKind::Ack);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_partial_frame_buffered() {
        let bytes = encode(TYPE_LCD, &lcd_packet());
        let mut decoder = FrameDecoder::new(ProtocolVersion::V2);

        assert_eq!(decoder.feed(&bytes[..5]).count(), 0);
        assert_eq!(decoder.pending(), 5);

        let frames: Vec<Frame> = decoder.feed(&bytes[5..]).collect();
        assert_eq!(frames, vec![Frame::new(FrameKind::Lcd, lcd_packet())]);
    }

    #[test]
    fn test_junk_reported_before_frame() {
        let mut bytes = vec![0x01, 0x02];
        bytes.extend(encode(TYPE_ACK, b"r"));

        let mut decoder = FrameDecoder::default();
        let frames: Vec<Frame> = decoder.feed(&bytes).collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].kind(), FrameKind::Unknown);
        assert_eq!(frames[0].raw_hex(), "0102");
        assert_eq!(frames[1].kind(), FrameKind::Ack);
    }

    #[test]
    fn test_bad_checksum_resyncs() {
        let mut corrupt = encode(TYPE_LOG, b"x");
        let last = corrupt.len() - 1;
        corrupt[last] = corrupt[last].wrapping_add(1);

        let mut bytes = corrupt.clone();
        bytes.extend(encode(TYPE_ACK, b"p"));

        let mut decoder = FrameDecoder::default();
        let frames: Vec<Frame> = decoder.feed(&bytes).collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].kind(), FrameKind::Unknown);
        assert_eq!(frames[0].payload(), corrupt.as_slice());
        assert_eq!(frames[1].kind(), FrameKind::Ack);
    }

    #[test]
    fn test_unknown_type_keeps_payload() {
        let mut decoder = FrameDecoder::default();
        let frames: Vec<Frame> = decoder.feed(&encode(b'Z', &[0x12, 0x34])).collect();
        assert_eq!(frames, vec![Frame::unknown(vec![0x12, 0x34])]);
    }

    #[test]
    fn test_packet_length_checked_against_version() {
        let mut decoder = FrameDecoder::new(ProtocolVersion::V1);
        let frames: Vec<Frame> = decoder.feed(&encode(TYPE_LCD, &lcd_packet())).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].kind(), FrameKind::Unknown);
    }

    #[test]
    fn test_flush_returns_partial() {
        let bytes = encode(TYPE_LOG, b"partial");
        let mut decoder = FrameDecoder::default();
        assert_eq!(decoder.feed(&bytes[..4]).count(), 0);

        let flushed = decoder.flush().unwrap();
        assert_eq!(flushed.kind(), FrameKind::Unknown);
        assert_eq!(flushed.payload(), &bytes[..4]);
        assert!(decoder.flush().is_none());
    }

    #[test]
    fn test_startless_noise_is_bounded() {
        let mut decoder = FrameDecoder::default();
        let noise = vec![0x00; 1024];
        let mut reported = 0;

        for _ in 0..100 {
            for frame in decoder.feed(&noise) {
                assert_eq!(frame.kind(), FrameKind::Unknown);
                reported += frame.payload().len();
            }
            assert!(decoder.pending() <= MAX_PENDING);
        }
        assert_eq!(reported + decoder.pending(), 100 * noise.len());

        // A frame after the noise still decodes.
        let frames: Vec<Frame> = decoder.feed(&encode(TYPE_ACK, b"p")).collect();
        assert_eq!(frames.last().map(Frame::kind), Some(FrameKind::Ack));
    }

    #[test]
    fn test_trailing_junk_waits_for_flush() {
        let mut decoder = FrameDecoder::default();
        assert_eq!(decoder.feed(&[0x10, 0x20]).count(), 0);
        assert_eq!(decoder.flush().map(|f| f.raw_hex().to_string()), Some("1020".into()));
    }
}
