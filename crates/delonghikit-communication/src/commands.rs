//! Command set
//!
//! Named builders for the commands the bridge understands. A [`Command`] is
//! pure data: its text has already been validated and encoded, so sending it
//! can only fail in the transport.

use delonghikit_core::CodecError;
use std::fmt;

use crate::codec::command_text::{CommandText, Opcode, Segment};
use crate::codec::wire::{self, TYPE_COMMAND};

/// Flag bytes of the first overwrite buffer when log streaming is on
const LOG_MASK_ON: [u8; 9] = [0x00, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF, 0x00];
/// Flag bytes of the second overwrite buffer when log streaming is on
const LOG_VALUES_ON: [u8; 9] = [0xFF; 9];
/// Marker closing the first overwrite buffer
const MARKER_MASK_END: u8 = 3;
/// Marker closing the second overwrite buffer
const MARKER_VALUES_END: u8 = 8;

/// An encodable operation issued to the appliance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    text: CommandText,
    encoded: Vec<u8>,
}

impl Command {
    /// Parse and validate command text
    pub fn new(name: impl Into<String>, text: &str) -> Result<Self, CodecError> {
        Self::from_text(name, CommandText::parse(text)?)
    }

    /// Build a command from already parsed text
    ///
    /// Fails if the encoded body does not fit in a single frame.
    pub fn from_text(name: impl Into<String>, text: CommandText) -> Result<Self, CodecError> {
        let encoded = crate::codec::encode_command(&text)?;
        Ok(Self {
            name: name.into(),
            text,
            encoded,
        })
    }

    fn builtin(name: &str, segments: Vec<Segment>) -> Self {
        let text = CommandText::from_segments(segments);
        let encoded = wire::write_frame(TYPE_COMMAND, &text.to_bytes());
        Self {
            name: name.to_string(),
            text,
            encoded,
        }
    }

    /// Command name, for logs and diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parsed command text
    pub fn text(&self) -> &CommandText {
        &self.text
    }

    /// Command body carried inside the frame
    pub fn body(&self) -> Vec<u8> {
        self.text.to_bytes()
    }

    /// Command body as upper-case hex
    pub fn hex_payload(&self) -> String {
        hex::encode_upper(self.body())
    }

    /// Complete wire frame
    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.text)
    }
}

/// Request a state report
pub fn poll() -> Command {
    Command::builtin("poll", vec![Segment::op(Opcode::Poll)])
}

/// Soft-reboot the machine
pub fn reset_machine() -> Command {
    Command::builtin("reset_machine", vec![Segment::op(Opcode::Reset)])
}

/// Reset the water filter counters
pub fn reset_filters() -> Command {
    Command::builtin("reset_filters", vec![Segment::op(Opcode::ResetFilters)])
}

/// Turn on bridge log streaming
pub fn enable_logging() -> Command {
    Command::builtin("enable_logging", logging_segments(true))
}

/// Turn off bridge log streaming
///
/// Positionally aligned with [`enable_logging`]; only the flag bytes differ.
pub fn disable_logging() -> Command {
    Command::builtin("disable_logging", logging_segments(false))
}

fn logging_segments(on: bool) -> Vec<Segment> {
    let (mask, values) = if on {
        (LOG_MASK_ON, LOG_VALUES_ON)
    } else {
        ([0u8; 9], [0u8; 9])
    };
    vec![
        Segment::op_with(Opcode::Buffer, mask),
        Segment::Marker(MARKER_MASK_END),
        Segment::op_with(Opcode::Buffer, values),
        Segment::Marker(MARKER_VALUES_END),
    ]
}

/// Select grind mode
///
/// Custom modes are passed through as their raw bytes without validation;
/// this only fails when the resulting command is too long for a frame.
pub fn set_grind_mode(mode: &GrindMode) -> Result<Command, CodecError> {
    let payload = match mode {
        GrindMode::Named(named) => vec![named.code()],
        GrindMode::Custom(raw) => raw.as_bytes().to_vec(),
    };
    Command::from_text(
        format!("set_grind_mode({})", mode),
        CommandText::from_segments(vec![Segment::op_with(Opcode::Grind, payload)]),
    )
}

/// Grind modes known to the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedGrindMode {
    /// Pre-ground coffee, grinder bypassed
    PreGround,
    /// Whole beans, grinder active
    Beans,
}

impl NamedGrindMode {
    /// Code byte sent to the bridge
    pub fn code(&self) -> u8 {
        match self {
            Self::PreGround => 0x01,
            Self::Beans => 0x00,
        }
    }
}

impl fmt::Display for NamedGrindMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreGround => write!(f, "preground"),
            Self::Beans => write!(f, "beans"),
        }
    }
}

/// Grind mode selection, named or passed through verbatim
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GrindMode {
    /// A mode the firmware defines
    Named(NamedGrindMode),
    /// Any other value, sent as-is
    Custom(String),
}

impl GrindMode {
    /// Pre-ground coffee
    pub const PREGROUND: GrindMode = GrindMode::Named(NamedGrindMode::PreGround);
    /// Whole beans
    pub const BEANS: GrindMode = GrindMode::Named(NamedGrindMode::Beans);
}

impl From<&str> for GrindMode {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "preground" | "pre-ground" | "pre_ground" => Self::PREGROUND,
            "beans" => Self::BEANS,
            _ => Self::Custom(value.to_string()),
        }
    }
}

impl From<String> for GrindMode {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<NamedGrindMode> for GrindMode {
    fn from(value: NamedGrindMode) -> Self {
        Self::Named(value)
    }
}

impl fmt::Display for GrindMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(named) => write!(f, "{}", named),
            Self::Custom(raw) => write!(f, "custom:{}", raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_command_text() {
        assert_eq!(poll().text().to_string(), "p");
        assert_eq!(reset_machine().text().to_string(), "r");
        assert_eq!(reset_filters().text().to_string(), "f");
        assert_eq!(
            enable_logging().text().to_string(),
            "b00FFFF00000000FF00t3bFFFFFFFFFFFFFFFFFFt8"
        );
        assert_eq!(
            disable_logging().text().to_string(),
            "b000000000000000000t3b000000000000000000t8"
        );
    }

    #[test]
    fn test_builtins_match_parsed_text() {
        for command in [
            poll(),
            reset_machine(),
            reset_filters(),
            enable_logging(),
            disable_logging(),
        ] {
            let parsed = Command::new(command.name(), &command.text().to_string()).unwrap();
            assert_eq!(parsed, command);
        }
    }

    #[test]
    fn test_logging_symmetry() {
        let on = enable_logging().body();
        let off = disable_logging().body();
        assert_eq!(on.len(), off.len());

        for (a, b) in on.iter().zip(off.iter()) {
            if a != b {
                assert_eq!((*a, *b), (0xFF, 0x00));
            }
        }
    }

    #[test]
    fn test_grind_modes() {
        assert_eq!(
            set_grind_mode(&GrindMode::PREGROUND).unwrap().text().to_string(),
            "g01"
        );
        assert_eq!(
            set_grind_mode(&GrindMode::BEANS).unwrap().text().to_string(),
            "g00"
        );

        let custom = set_grind_mode(&GrindMode::from("other")).unwrap();
        assert_eq!(custom.body(), b"gother".to_vec());
        assert_eq!(custom.text().to_string(), "g6F74686572");
    }

    #[test]
    fn test_grind_mode_from_str() {
        assert_eq!(GrindMode::from("PreGround"), GrindMode::PREGROUND);
        assert_eq!(GrindMode::from("beans"), GrindMode::BEANS);
        assert_eq!(GrindMode::from("espresso"), GrindMode::Custom("espresso".into()));
    }

    #[test]
    fn test_custom_grind_too_long() {
        let mode = GrindMode::Custom("x".repeat(300));
        assert!(set_grind_mode(&mode).is_err());
    }

    #[test]
    fn test_invalid_command_fails_at_construction() {
        assert!(Command::new("bad", "bZZ").is_err());
        assert!(Command::new("bad", "q").is_err());
    }

    #[test]
    fn test_hex_payload() {
        assert_eq!(poll().hex_payload(), "70");
        assert_eq!(poll().encoded(), &[0xAA, 0x01, b'C', b'p', 0x09]);
    }
}
