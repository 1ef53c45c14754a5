//! # DelonghiKit
//!
//! Protocol engine for De'Longhi appliance bridges. The bridge sits between
//! the display board and the power board of the machine and exposes both
//! packet streams, plus its own log, over a serial line.
//!
//! ## Architecture
//!
//! DelonghiKit is organized as a workspace with multiple crates:
//!
//! 1. **delonghikit-core** - Errors, frames, appliance packets, state store
//! 2. **delonghikit-communication** - Codec, command set, transports, engine
//! 3. **delonghikit-settings** - Configuration files
//! 4. **delonghikit** - Console binary that integrates all crates
//!
//! ## Example
//!
//! ```no_run
//! use delonghikit::{init, EngineConfig, GrindMode};
//!
//! # fn main() -> delonghikit::Result<()> {
//! let engine = init(EngineConfig::default())?;
//! let _sub = engine.subscribe(|state| {
//!     if let Some(lcd) = &state.lcd {
//!         println!("LCD {}", lcd.raw_hex());
//!     }
//! });
//! engine.poll()?;
//! engine.set_grind_mode(GrindMode::PREGROUND)?;
//! # Ok(())
//! # }
//! ```

pub mod console;

pub use delonghikit_core::{
    packet, ChecksumErrors, CodecError, DevicePacket, DeviceState, EngineError, Error, Frame,
    FrameKind, ProtocolVersion, Result, StateStore, StateStoreConfig, Subscription,
    SubscriptionId, TransportError,
};

pub use delonghikit_communication::{
    commands, encode, init, init_with, list_ports, Command, ConnectionStatus, Engine,
    EngineConfig, EngineState, GrindMode, LoopbackTransport, NamedGrindMode, SerialParams,
    SerialParity, SerialPortInfo, SerialTransport, Transport, TransportListener,
    TransportSelection,
};

pub use delonghikit_settings::{default_config_path, Config, SettingsError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable, multi-line
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Initialize logging with the default configuration
pub fn init_logging() -> anyhow::Result<()> {
    init_logging_with(LogFormat::default())
}

/// Initialize logging
///
/// Sets up structured logging with:
/// - Output on stderr, keeping stdout for device state
/// - RUST_LOG environment variable support (default `info`)
/// - Thread names, so reader-thread activity is recognizable
pub fn init_logging_with(format: LogFormat) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true)
                    .with_thread_names(true)
                    .with_line_number(true)
                    .pretty(),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_thread_names(true)
                    .json(),
            )
            .try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))
}
