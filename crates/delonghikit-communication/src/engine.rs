//! Protocol engine
//!
//! The engine wires a [`Transport`] to the frame codec and the
//! [`StateStore`]. Outbound, it encodes commands and writes them; inbound, it
//! decodes frames on the transport's delivery thread and applies them to the
//! store, which notifies subscribers.
//!
//! ```text
//!   send_data ──encode──> Transport ~~~ bridge ~~~> Transport
//!                                                     │ on_data
//!                                                     v
//!   subscribers <──notify── StateStore <──apply── FrameDecoder
//! ```

use delonghikit_core::{
    DeviceState, EngineError, Error, Frame, ProtocolVersion, Result, StateStore,
    StateStoreConfig, Subscription, TransportError,
};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::codec::{self, FrameDecoder};
use crate::commands::{self, Command, GrindMode};
use crate::transport::{
    ConnectionStatus, SerialParams, SerialTransport, Transport, TransportListener,
};

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    /// Created, no transport yet
    Uninitialized,
    /// Opening the transport
    Initializing,
    /// Transport open, commands accepted
    Ready,
    /// Transport lost or shut down; `reconnect` brings the engine back
    Disconnected,
    /// Opening the transport failed
    Error,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::Initializing => write!(f, "Initializing"),
            Self::Ready => write!(f, "Ready"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Serial parameters used by [`TransportSelection::Default`]
    pub serial: SerialParams,
    /// Appliance protocol generation
    pub protocol_version: ProtocolVersion,
    /// State store configuration
    pub store: StateStoreConfig,
}

/// Which transport `init` and `reconnect` use
pub enum TransportSelection {
    /// Serial port from the engine configuration
    Default,
    /// Caller supplied transport, already open
    Custom(Box<dyn Transport>),
}

impl TransportSelection {
    /// Wrap any transport
    pub fn custom(transport: impl Transport + 'static) -> Self {
        Self::Custom(Box::new(transport))
    }
}

impl fmt::Debug for TransportSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "Default"),
            Self::Custom(transport) => write!(f, "Custom({})", transport.name()),
        }
    }
}

struct EngineInner {
    config: EngineConfig,
    store: Arc<StateStore>,
    state: RwLock<EngineState>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    /// Serializes init, reconnect and shutdown
    lifecycle: Mutex<()>,
    /// Bumped on every connect so stale pipelines can be ignored
    generation: AtomicU64,
}

impl EngineInner {
    /// Move from `from` to `to`, returning whether the transition happened
    fn transition(&self, from: EngineState, to: EngineState) -> bool {
        let mut state = self.state.write();
        if *state == from {
            *state = to;
            tracing::info!("Engine state {} -> {}", from, to);
            true
        } else {
            false
        }
    }

    fn set_state(&self, to: EngineState) {
        let mut state = self.state.write();
        if *state != to {
            tracing::info!("Engine state {} -> {}", *state, to);
            *state = to;
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Some(transport) = self.transport.get_mut().take() {
            transport.close();
        }
    }
}

/// Transport listener that decodes inbound bytes into the store
struct DecodePipeline {
    decoder: Mutex<FrameDecoder>,
    store: Arc<StateStore>,
    engine: Weak<EngineInner>,
    generation: u64,
}

impl DecodePipeline {
    fn apply_all(&self, frames: Vec<Frame>) {
        for frame in frames {
            tracing::debug!("<- {}", frame);
            self.store.apply(frame);
        }
    }

    fn is_current(&self, engine: &EngineInner) -> bool {
        engine.generation.load(Ordering::SeqCst) == self.generation
    }
}

impl TransportListener for DecodePipeline {
    fn on_data(&self, data: &[u8]) {
        let frames: Vec<Frame> = self.decoder.lock().feed(data).collect();
        self.apply_all(frames);
    }

    fn on_status_changed(&self, status: ConnectionStatus) {
        tracing::debug!("Transport status changed to {}", status);

        let next = match status {
            ConnectionStatus::Disconnected => EngineState::Disconnected,
            ConnectionStatus::Error => EngineState::Error,
            ConnectionStatus::Open | ConnectionStatus::Connecting => return,
        };

        let partial = self.decoder.lock().flush();
        self.apply_all(partial.into_iter().collect());

        if let Some(engine) = self.engine.upgrade() {
            if self.is_current(&engine) && engine.transition(EngineState::Ready, next) {
                tracing::warn!("Connection lost");
            }
        }
    }
}

/// Handle to the protocol engine
///
/// Cheap to clone; all clones drive the same connection and store.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine in the `Uninitialized` state
    pub fn new(config: EngineConfig) -> Self {
        let store = Arc::new(StateStore::with_config(config.store.clone()));
        Self {
            inner: Arc::new(EngineInner {
                config,
                store,
                state: RwLock::new(EngineState::Uninitialized),
                transport: RwLock::new(None),
                lifecycle: Mutex::new(()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Open the transport and start decoding
    ///
    /// Fails with [`EngineError::AlreadyInitialized`] unless the engine is
    /// `Uninitialized`. On failure the engine moves to `Error`.
    pub fn init(&self, selection: TransportSelection) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock();
        if !self
            .inner
            .transition(EngineState::Uninitialized, EngineState::Initializing)
        {
            return Err(EngineError::AlreadyInitialized.into());
        }
        self.open(selection)
    }

    /// Bring a `Disconnected` or `Error` engine back to `Ready`
    pub fn reconnect(&self, selection: TransportSelection) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock();
        match self.state() {
            EngineState::Disconnected | EngineState::Error => {}
            EngineState::Uninitialized => {
                return Err(EngineError::NotReady {
                    state: EngineState::Uninitialized.to_string(),
                }
                .into())
            }
            EngineState::Initializing | EngineState::Ready => {
                return Err(EngineError::AlreadyInitialized.into())
            }
        }

        self.inner.set_state(EngineState::Initializing);
        if let Some(old) = self.inner.transport.write().take() {
            old.close();
        }
        self.open(selection)
    }

    /// Close the transport
    ///
    /// The engine ends up `Disconnected` and can be brought back with
    /// [`Engine::reconnect`].
    pub fn shutdown(&self) {
        let _lifecycle = self.inner.lifecycle.lock();
        // Invalidate the pipeline first so closing does not race a status change.
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(transport) = self.inner.transport.write().take() {
            transport.close();
            tracing::info!("Engine shut down ({})", transport.name());
        }
        if self.state() != EngineState::Uninitialized {
            self.inner.set_state(EngineState::Disconnected);
        }
    }

    fn open(&self, selection: TransportSelection) -> Result<()> {
        match self.connect(selection) {
            Ok(name) => {
                self.inner.set_state(EngineState::Ready);
                tracing::info!("Engine ready on {}", name);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Engine failed to open transport: {}", e);
                self.inner.set_state(EngineState::Error);
                Err(e)
            }
        }
    }

    fn connect(&self, selection: TransportSelection) -> Result<String> {
        let transport: Arc<dyn Transport> = match selection {
            TransportSelection::Default => {
                Arc::new(SerialTransport::open(&self.inner.config.serial)?)
            }
            TransportSelection::Custom(transport) => Arc::from(transport),
        };

        let status = transport.status();
        if !status.is_open() {
            return Err(TransportError::open_failed(
                transport.name(),
                format!("transport is {}", status),
            )
            .into());
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let pipeline = Arc::new(DecodePipeline {
            decoder: Mutex::new(FrameDecoder::new(self.inner.config.protocol_version)),
            store: self.inner.store.clone(),
            engine: Arc::downgrade(&self.inner),
            generation,
        });
        transport.set_listener(pipeline);

        let name = transport.name();
        *self.inner.transport.write() = Some(transport);
        Ok(name)
    }

    /// Encode command text and write it to the transport
    pub fn send_data(&self, text: &str) -> Result<()> {
        self.ensure_ready()?;
        let bytes = codec::encode(text)?;
        self.write(&bytes, text)
    }

    /// Write a prebuilt command
    pub fn send(&self, command: &Command) -> Result<()> {
        self.ensure_ready()?;
        self.write(command.encoded(), command.name())
    }

    /// Request a state report
    pub fn poll(&self) -> Result<()> {
        self.send(&commands::poll())
    }

    /// Soft-reboot the machine
    pub fn reset_machine(&self) -> Result<()> {
        self.send(&commands::reset_machine())
    }

    /// Reset the water filter counters
    pub fn reset_filters(&self) -> Result<()> {
        self.send(&commands::reset_filters())
    }

    /// Turn on bridge log streaming
    pub fn enable_logging(&self) -> Result<()> {
        self.send(&commands::enable_logging())
    }

    /// Turn off bridge log streaming
    pub fn disable_logging(&self) -> Result<()> {
        self.send(&commands::disable_logging())
    }

    /// Select grind mode
    pub fn set_grind_mode(&self, mode: impl Into<GrindMode>) -> Result<()> {
        let command = commands::set_grind_mode(&mode.into())?;
        self.send(&command)
    }

    fn write(&self, bytes: &[u8], label: &str) -> Result<()> {
        let transport = self.inner.transport.read().clone().ok_or_else(|| {
            Error::from(EngineError::NotReady {
                state: self.state().to_string(),
            })
        })?;

        match transport.write(bytes) {
            Ok(()) => {
                tracing::debug!("-> {} [{}]", label, hex::encode_upper(bytes));
                Ok(())
            }
            Err(TransportError::Disconnected) => {
                tracing::error!("Cannot send {}: transport disconnected", label);
                self.inner
                    .transition(EngineState::Ready, EngineState::Disconnected);
                Err(TransportError::Disconnected.into())
            }
            Err(e) => {
                tracing::error!("Cannot send {}: {}", label, e);
                Err(e.into())
            }
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        let state = self.state();
        if state != EngineState::Ready {
            return Err(EngineError::NotReady {
                state: state.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Register a state observer
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&DeviceState) + Send + Sync + 'static,
    {
        self.inner.store.subscribe(handler)
    }

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        *self.inner.state.read()
    }

    /// Snapshot of the decoded device state
    pub fn device_state(&self) -> DeviceState {
        self.inner.store.snapshot()
    }

    /// The state store fed by this engine
    pub fn store(&self) -> Arc<StateStore> {
        self.inner.store.clone()
    }

    /// Status of the current transport
    pub fn status(&self) -> ConnectionStatus {
        self.inner
            .transport
            .read()
            .as_ref()
            .map(|t| t.status())
            .unwrap_or(ConnectionStatus::Disconnected)
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state())
            .field("status", &self.status())
            .field("protocol", &self.inner.config.protocol_version)
            .finish()
    }
}

/// Create an engine and open the configured serial port in one step
pub fn init(config: EngineConfig) -> Result<Engine> {
    init_with(config, TransportSelection::Default)
}

/// Create an engine and open the given transport in one step
pub fn init_with(config: EngineConfig, selection: TransportSelection) -> Result<Engine> {
    let engine = Engine::new(config);
    engine.init(selection)?;
    Ok(engine)
}
