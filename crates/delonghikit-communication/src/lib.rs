//! # DelonghiKit Communication
//!
//! Talks to the appliance bridge: encodes commands into wire frames, moves
//! bytes over a serial or loopback transport, decodes the inbound stream and
//! feeds the decoded frames into the device state store.

pub mod codec;
pub mod commands;
pub mod engine;
pub mod transport;

pub use codec::{encode, CommandText, FrameDecoder, Frames, WireFrame};
pub use commands::{Command, GrindMode, NamedGrindMode};
pub use engine::{init, init_with, Engine, EngineConfig, EngineState, TransportSelection};
pub use transport::{
    list_ports, ConnectionStatus, LoopbackTransport, SerialParams, SerialParity,
    SerialPortInfo, SerialTransport, Transport, TransportListener,
};
