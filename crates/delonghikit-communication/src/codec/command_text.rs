//! Command text grammar
//!
//! Human-issued commands are ASCII strings made of segments:
//!
//! ```text
//! command  := segment+
//! segment  := opcode hexrun | marker
//! opcode   := 'p' | 'r' | 'f' | 'b' | 'g'
//! hexrun   := (hexdigit hexdigit)*
//! marker   := 't' digit
//! ```
//!
//! Hex pairs are consumed greedily, so a lone `b` or `f` left after a run
//! starts the next segment. A leftover single hex digit is an odd-length run.
//!
//! Examples: `p` (poll), `r` (reset), `b0011t3bFFEEt8` (two buffer segments
//! separated by markers 3 and 8).
//!
//! Each segment encodes to bytes as the opcode's ASCII byte followed by the
//! decoded hex run; a marker encodes as `b't'` followed by the digit value.

use delonghikit_core::CodecError;
use std::fmt;

/// Command opcodes understood by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Report current device state
    Poll,
    /// Soft-reboot the machine
    Reset,
    /// Reset the water filter counters
    ResetFilters,
    /// Write an overwrite buffer (mask or values)
    Buffer,
    /// Select grind mode
    Grind,
}

impl Opcode {
    /// ASCII letter of the opcode
    pub fn letter(&self) -> u8 {
        match self {
            Self::Poll => b'p',
            Self::Reset => b'r',
            Self::ResetFilters => b'f',
            Self::Buffer => b'b',
            Self::Grind => b'g',
        }
    }

    /// Resolve an ASCII letter to an opcode
    pub fn from_letter(letter: u8) -> Option<Self> {
        match letter {
            b'p' => Some(Self::Poll),
            b'r' => Some(Self::Reset),
            b'f' => Some(Self::ResetFilters),
            b'b' => Some(Self::Buffer),
            b'g' => Some(Self::Grind),
            _ => None,
        }
    }
}

const MARKER: u8 = b't';

/// One segment of a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Opcode followed by its payload bytes
    Op {
        /// Segment opcode.
        opcode: Opcode,
        /// Payload bytes (hex-encoded in the text form).
        payload: Vec<u8>,
    },
    /// Delimiter token `t<digit>`
    Marker(u8),
}

impl Segment {
    /// Opcode segment without payload
    pub fn op(opcode: Opcode) -> Self {
        Segment::Op {
            opcode,
            payload: Vec::new(),
        }
    }

    /// Opcode segment with payload
    pub fn op_with(opcode: Opcode, payload: impl Into<Vec<u8>>) -> Self {
        Segment::Op {
            opcode,
            payload: payload.into(),
        }
    }
}

/// A parsed command text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandText {
    segments: Vec<Segment>,
}

impl CommandText {
    /// Build a command from typed segments
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Parse command text
    ///
    /// Fails with [`CodecError::InvalidHex`] on odd-length hex runs,
    /// characters that are neither hex nor a known token, and empty input.
    pub fn parse(text: &str) -> Result<Self, CodecError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CodecError::invalid_hex(0, "empty command"));
        }
        if let Some(offset) = text.find(|c: char| !c.is_ascii()) {
            return Err(CodecError::invalid_hex(offset, "non-ASCII character"));
        }

        let bytes = text.as_bytes();
        let mut segments = Vec::new();
        let mut i = 0;

        while i < bytes.len() {
            let c = bytes[i];

            if c == MARKER {
                match bytes.get(i + 1) {
                    Some(d) if d.is_ascii_digit() => {
                        segments.push(Segment::Marker(d - b'0'));
                        i += 2;
                        continue;
                    }
                    _ => {
                        return Err(CodecError::invalid_hex(
                            i,
                            "marker 't' must be followed by a digit",
                        ))
                    }
                }
            }

            let Some(opcode) = Opcode::from_letter(c) else {
                return Err(CodecError::invalid_hex(
                    i,
                    format!("expected opcode or marker, found '{}'", c as char),
                ));
            };
            i += 1;

            let start = i;
            while i + 1 < bytes.len()
                && bytes[i].is_ascii_hexdigit()
                && bytes[i + 1].is_ascii_hexdigit()
            {
                i += 2;
            }
            let payload = hex::decode(&text[start..i])
                .map_err(|e| CodecError::invalid_hex(start, e.to_string()))?;

            if let Some(&next) = bytes.get(i) {
                if next != MARKER && Opcode::from_letter(next).is_none() {
                    return Err(if next.is_ascii_hexdigit() {
                        CodecError::invalid_hex(start, "odd-length hex run")
                    } else {
                        CodecError::invalid_hex(i, format!("non-hex character '{}'", next as char))
                    });
                }
            }

            segments.push(Segment::Op { opcode, payload });
        }

        Ok(Self { segments })
    }

    /// Parsed segments
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Encode segments into the command body carried by a wire frame
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for segment in &self.segments {
            match segment {
                Segment::Op { opcode, payload } => {
                    out.push(opcode.letter());
                    out.extend_from_slice(payload);
                }
                Segment::Marker(id) => {
                    out.push(MARKER);
                    out.push(*id);
                }
            }
        }
        out
    }
}

impl fmt::Display for CommandText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Op { opcode, payload } => {
                    write!(f, "{}{}", opcode.letter() as char, hex::encode_upper(payload))?
                }
                Segment::Marker(id) => write!(f, "t{}", id)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_letter_commands() {
        let poll = CommandText::parse("p").unwrap();
        assert_eq!(poll.segments(), &[Segment::op(Opcode::Poll)]);
        assert_eq!(poll.to_bytes(), vec![b'p']);

        let reset = CommandText::parse("r").unwrap();
        assert_eq!(reset.to_bytes(), vec![b'r']);
    }

    #[test]
    fn test_composite_command() {
        let text = CommandText::parse("b00FF11t3bAA22t8").unwrap();
        assert_eq!(
            text.segments(),
            &[
                Segment::op_with(Opcode::Buffer, vec![0x00, 0xFF, 0x11]),
                Segment::Marker(3),
                Segment::op_with(Opcode::Buffer, vec![0xAA, 0x22]),
                Segment::Marker(8),
            ]
        );
        assert_eq!(
            text.to_bytes(),
            vec![b'b', 0x00, 0xFF, 0x11, b't', 3, b'b', 0xAA, 0x22, b't', 8]
        );
    }

    #[test]
    fn test_display_round_trips_text() {
        let source = "b00FFFF00000000FF00t3bFFFFFFFFFFFFFFFFFFt8";
        let text = CommandText::parse(source).unwrap();
        assert_eq!(text.to_string(), source);
    }

    #[test]
    fn test_lower_case_hex_accepted() {
        let text = CommandText::parse("g0a").unwrap();
        assert_eq!(text.to_bytes(), vec![b'g', 0x0A]);
    }

    #[test]
    fn test_non_hex_payload_rejected() {
        let err = CommandText::parse("bZZ").unwrap_err();
        assert!(matches!(err, CodecError::InvalidHex { offset: 1, .. }));
    }

    #[test]
    fn test_odd_length_rejected() {
        let err = CommandText::parse("b0").unwrap_err();
        assert!(matches!(err, CodecError::InvalidHex { offset: 1, .. }));
    }

    #[test]
    fn test_opcode_after_payload() {
        let text = CommandText::parse("b00f").unwrap();
        assert_eq!(
            text.segments(),
            &[
                Segment::op_with(Opcode::Buffer, vec![0x00]),
                Segment::op(Opcode::ResetFilters),
            ]
        );
        assert!(CommandText::parse("b0p").is_err());
    }

    #[test]
    fn test_bad_marker_rejected() {
        assert!(CommandText::parse("b00tx").is_err());
        assert!(CommandText::parse("b00t").is_err());
    }

    #[test]
    fn test_empty_and_unknown_rejected() {
        assert!(CommandText::parse("").is_err());
        assert!(CommandText::parse("   ").is_err());
        assert!(CommandText::parse("x").is_err());
        assert!(CommandText::parse("00").is_err());
        assert!(CommandText::parse("pé").is_err());
    }
}
