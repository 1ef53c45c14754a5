//! Byte transports to the appliance bridge
//!
//! A [`Transport`] moves raw bytes. It knows nothing about frames: inbound
//! bytes are handed to a [`TransportListener`] in arrival order and the
//! protocol engine does the decoding.

pub mod loopback;
pub mod serial;

pub use loopback::LoopbackTransport;
pub use serial::{list_ports, SerialParams, SerialParity, SerialPortInfo, SerialTransport};

use delonghikit_core::TransportError;
use std::fmt;
use std::sync::Arc;

/// Connection status reported by a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// Not connected
    Disconnected,
    /// Opening
    Connecting,
    /// Open and passing bytes
    Open,
    /// Failed; the transport will not recover on its own
    Error,
}

impl ConnectionStatus {
    /// Whether bytes can be written
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Listener trait for transport events
///
/// A transport never calls its listener concurrently.
pub trait TransportListener: Send + Sync {
    /// Called with inbound bytes, in arrival order
    fn on_data(&self, data: &[u8]);

    /// Called when the connection status changes
    fn on_status_changed(&self, _status: ConnectionStatus) {}
}

/// Raw byte channel to the bridge
pub trait Transport: Send + Sync {
    /// Human readable name (port path, "loopback", ...)
    fn name(&self) -> String;

    /// Current connection status
    fn status(&self) -> ConnectionStatus;

    /// Write bytes, serialized with other writers
    ///
    /// Fails immediately with [`TransportError::Disconnected`] once the
    /// connection is gone.
    fn write(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Register the listener that receives inbound bytes
    ///
    /// Replaces any previously registered listener.
    fn set_listener(&self, listener: Arc<dyn TransportListener>);

    /// Close the channel and stop delivering bytes
    fn close(&self);
}

impl fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("name", &self.name())
            .field("status", &self.status())
            .finish()
    }
}
