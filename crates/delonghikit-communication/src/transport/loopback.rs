//! In-memory transport
//!
//! Records everything written to it and lets the caller inject inbound
//! bytes, standing in for the bridge in tests and offline sessions. In echo
//! mode every write is delivered straight back to the listener.

use delonghikit_core::TransportError;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::sync::Arc;

use super::{ConnectionStatus, Transport, TransportListener};

struct Inner {
    status: RwLock<ConnectionStatus>,
    written: Mutex<Vec<Vec<u8>>>,
    listener: RwLock<Option<Arc<dyn TransportListener>>>,
    /// Held while calling the listener so deliveries from different threads
    /// never overlap. Reentrant so a listener may write to an echoing loopback.
    deliver_gate: ReentrantMutex<()>,
    echo: bool,
}

/// Loopback transport
///
/// Cloning yields another handle to the same channel, so a test can keep one
/// handle while the engine owns another.
#[derive(Clone)]
pub struct LoopbackTransport {
    inner: Arc<Inner>,
}

impl LoopbackTransport {
    /// Create an open loopback that only records writes
    pub fn new() -> Self {
        Self::build(false)
    }

    /// Create an open loopback that echoes every write back as inbound bytes
    pub fn with_echo() -> Self {
        Self::build(true)
    }

    fn build(echo: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                status: RwLock::new(ConnectionStatus::Open),
                written: Mutex::new(Vec::new()),
                listener: RwLock::new(None),
                deliver_gate: ReentrantMutex::new(()),
                echo,
            }),
        }
    }

    /// Deliver bytes to the listener as if the bridge had sent them
    pub fn inject(&self, data: &[u8]) {
        let listener = self.inner.listener.read().clone();
        if let Some(listener) = listener {
            let _gate = self.inner.deliver_gate.lock();
            listener.on_data(data);
        }
    }

    /// Simulate losing the connection
    pub fn disconnect(&self) {
        self.drop_link(ConnectionStatus::Disconnected);
    }

    /// Simulate a link fault reported by the port
    pub fn fail(&self) {
        self.drop_link(ConnectionStatus::Error);
    }

    fn drop_link(&self, status: ConnectionStatus) {
        self.set_status(status);
        let listener = self.inner.listener.read().clone();
        if let Some(listener) = listener {
            let _gate = self.inner.deliver_gate.lock();
            listener.on_status_changed(status);
        }
    }

    /// Frames written so far, one entry per write
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.inner.written.lock().clone()
    }

    /// Take and clear the recorded writes
    pub fn take_written(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.inner.written.lock())
    }

    fn set_status(&self, status: ConnectionStatus) {
        *self.inner.status.write() = status;
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for LoopbackTransport {
    fn name(&self) -> String {
        "loopback".to_string()
    }

    fn status(&self) -> ConnectionStatus {
        *self.inner.status.read()
    }

    fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.status().is_open() {
            return Err(TransportError::Disconnected);
        }

        self.inner.written.lock().push(data.to_vec());
        tracing::trace!("loopback wrote {} bytes", data.len());

        if self.inner.echo {
            self.inject(data);
        }
        Ok(())
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        *self.inner.listener.write() = Some(listener);
    }

    fn close(&self) {
        self.set_status(ConnectionStatus::Disconnected);
    }
}

impl std::fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("status", &self.status())
            .field("echo", &self.inner.echo)
            .field("writes", &self.inner.written.lock().len())
            .finish()
    }
}
