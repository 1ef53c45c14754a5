//! Error handling for DelonghiKit
//!
//! Provides error types for each layer of the protocol engine:
//! - Transport errors (byte channel to the appliance bridge)
//! - Codec errors (command text and wire frame encoding)
//! - Engine errors (lifecycle violations)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Transport error type
///
/// Represents failures of the raw byte channel to the appliance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection is gone; writes fail immediately instead of queuing
    #[error("Transport disconnected")]
    Disconnected,

    /// A write could not be completed
    #[error("Write failed: {reason}")]
    WriteFailed {
        /// The reason the write failed.
        reason: String,
    },

    /// The channel could not be opened
    #[error("Failed to open {target}: {reason}")]
    OpenFailed {
        /// The port or endpoint that failed to open.
        target: String,
        /// The reason the open failed.
        reason: String,
    },
}

impl TransportError {
    /// Create a write failure from any displayable reason
    pub fn write_failed(reason: impl Into<String>) -> Self {
        TransportError::WriteFailed {
            reason: reason.into(),
        }
    }

    /// Create an open failure for the given target
    pub fn open_failed(target: impl Into<String>, reason: impl Into<String>) -> Self {
        TransportError::OpenFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

/// Codec error type
///
/// Represents errors translating command text into wire frames
/// and wire bytes into frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Command text contains malformed hex (odd length, non-hex character)
    /// or is otherwise not a valid command
    #[error("Invalid hex at offset {offset}: {reason}")]
    InvalidHex {
        /// Character offset into the command text.
        offset: usize,
        /// Description of the problem.
        reason: String,
    },

    /// Not enough bytes to make up a whole frame
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of bytes still missing.
        needed: usize,
    },

    /// Frame type byte is not one this protocol version knows
    #[error("Unknown frame kind 0x{type_byte:02X}")]
    UnknownFrameKind {
        /// The unrecognized type byte.
        type_byte: u8,
    },

    /// Frame checksum does not match its contents
    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch {
        /// Checksum computed over the frame.
        expected: u8,
        /// Checksum byte found on the wire.
        actual: u8,
    },

    /// Bytes do not begin with a frame start byte
    #[error("Expected frame start, found 0x{found:02X}")]
    MissingStart {
        /// The byte found where the start byte was expected.
        found: u8,
    },
}

impl CodecError {
    /// Create an invalid hex error at the given text offset
    pub fn invalid_hex(offset: usize, reason: impl Into<String>) -> Self {
        CodecError::InvalidHex {
            offset,
            reason: reason.into(),
        }
    }
}

/// Engine error type
///
/// Represents protocol engine lifecycle violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Operation requires the engine to be in the Ready state
    #[error("Engine not ready (state: {state})")]
    NotReady {
        /// Name of the state the engine was in.
        state: String,
    },

    /// `init` was called on an engine that has already been initialized
    #[error("Engine already initialized")]
    AlreadyInitialized,
}

/// Main error type for DelonghiKit
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Codec error
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Engine error
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a disconnect
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Error::Transport(TransportError::Disconnected))
    }

    /// Check if this is a transport error
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Check if this is a codec error
    pub fn is_codec_error(&self) -> bool {
        matches!(self, Error::Codec(_))
    }

    /// Check if this is an engine error
    pub fn is_engine_error(&self) -> bool {
        matches!(self, Error::Engine(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CodecError::invalid_hex(1, "non-hex character 'Z'");
        assert_eq!(err.to_string(), "Invalid hex at offset 1: non-hex character 'Z'");

        let err = TransportError::open_failed("/dev/ttyUSB0", "busy");
        assert_eq!(err.to_string(), "Failed to open /dev/ttyUSB0: busy");

        let err = EngineError::NotReady {
            state: "Uninitialized".to_string(),
        };
        assert_eq!(err.to_string(), "Engine not ready (state: Uninitialized)");
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = TransportError::Disconnected.into();
        assert!(err.is_disconnected());
        assert!(err.is_transport_error());

        let err: Error = CodecError::UnknownFrameKind { type_byte: 0x7F }.into();
        assert!(err.is_codec_error());
        assert!(!err.is_transport_error());

        let err: Error = EngineError::AlreadyInitialized.into();
        assert!(err.is_engine_error());
    }
}
