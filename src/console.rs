//! Interactive console
//!
//! Parses command lines typed by the user and describes device state
//! changes as printable lines.

use delonghikit_communication::{Engine, GrindMode};
use delonghikit_core::{DevicePacket, DeviceState, Frame, Result};

/// A command typed at the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Request a state report
    Poll,
    /// Soft-reboot the machine
    Reset,
    /// Reset the water filter counters
    ResetFilters,
    /// Turn bridge log streaming on or off
    Logging(bool),
    /// Select grind mode
    Grind(GrindMode),
    /// Print the full device state
    State,
    /// Drop the log history
    ClearLog,
    /// Print usage
    Help,
    /// Leave the console
    Quit,
    /// Anything else is sent as command text
    Raw(String),
}

/// Usage text printed by `help`
pub const HELP: &str = "\
commands:
  poll              request a state report
  reset             soft-reboot the machine
  filters           reset the water filter counters
  log on|off        toggle bridge log streaming
  grind <mode>      preground, beans, or any custom value
  state             print the current device state
  clear             drop the log history
  help              show this help
  quit              exit
anything else is sent as raw command text (e.g. b00FF...t3)";

impl ConsoleCommand {
    /// Parse a console line; `None` for blank lines
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match (word.to_ascii_lowercase().as_str(), rest) {
            ("poll", "") => Self::Poll,
            ("reset", "") => Self::Reset,
            ("filters", "") => Self::ResetFilters,
            ("log", "on") => Self::Logging(true),
            ("log", "off") => Self::Logging(false),
            ("grind", mode) if !mode.is_empty() => Self::Grind(GrindMode::from(mode)),
            ("state", "") => Self::State,
            ("clear", "") => Self::ClearLog,
            ("help", "") | ("?", "") => Self::Help,
            ("quit", "") | ("exit", "") => Self::Quit,
            _ => Self::Raw(line.to_string()),
        };
        Some(command)
    }

    /// Send the command through the engine
    ///
    /// Local commands (`state`, `help`, `quit`) do nothing here.
    pub fn execute(&self, engine: &Engine) -> Result<()> {
        match self {
            Self::Poll => engine.poll(),
            Self::Reset => engine.reset_machine(),
            Self::ResetFilters => engine.reset_filters(),
            Self::Logging(true) => engine.enable_logging(),
            Self::Logging(false) => engine.disable_logging(),
            Self::Grind(mode) => engine.set_grind_mode(mode.clone()),
            Self::Raw(text) => engine.send_data(text),
            Self::ClearLog => {
                engine.store().clear_log();
                Ok(())
            }
            Self::State | Self::Help | Self::Quit => Ok(()),
        }
    }
}

fn describe_packet(label: &str, frame: &Frame) -> String {
    match DevicePacket::from_frame(frame) {
        Some(packet) if !packet.start_byte_ok() => {
            format!("{} {} (unexpected start byte)", label, frame.raw_hex())
        }
        _ => format!("{} {}", label, frame.raw_hex()),
    }
}

/// Lines describing what changed between two states
pub fn describe_changes(previous: &DeviceState, current: &DeviceState) -> Vec<String> {
    let mut lines = Vec::new();

    if current.lcd != previous.lcd {
        if let Some(frame) = &current.lcd {
            lines.push(describe_packet("LCD", frame));
        }
    }
    if current.packet_buffer != previous.packet_buffer {
        if let Some(frame) = &current.packet_buffer {
            lines.push(describe_packet("PB ", frame));
        }
    }

    let fresh = current
        .log_total
        .saturating_sub(previous.log_total)
        .min(current.log.len() as u64) as usize;
    for frame in current.log.iter().skip(current.log.len() - fresh) {
        lines.push(format!("LOG {}", frame.text()));
    }

    if current.last_ack != previous.last_ack {
        if let Some(frame) = &current.last_ack {
            lines.push(format!("ACK {}", frame.text()));
        }
    }
    if current.last_unknown != previous.last_unknown {
        if let Some(frame) = &current.last_unknown {
            lines.push(format!("??? {}", frame.raw_hex()));
        }
    }
    if current.checksum_errors != previous.checksum_errors {
        lines.push(format!(
            "checksum errors: lcd={} pb={}",
            current.checksum_errors.lcd, current.checksum_errors.packet_buffer
        ));
    }

    lines
}
