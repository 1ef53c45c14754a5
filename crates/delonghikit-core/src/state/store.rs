//! State store implementation.
//!
//! Provides the [`StateStore`], the single writer of [`DeviceState`], and the
//! [`Subscription`] handle returned to observers.

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use uuid::Uuid;

use super::device::DeviceState;
use crate::frame::{Frame, FrameKind};

/// Subscription identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new unique subscription ID
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// Type alias for state observer functions
type StateHandler = Arc<dyn Fn(&DeviceState) + Send + Sync>;

type HandlerMap = RwLock<HashMap<SubscriptionId, StateHandler>>;

/// Configuration for the state store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateStoreConfig {
    /// Maximum number of log entries to retain. `None` keeps everything.
    pub max_log_entries: Option<usize>,
}

/// Handle to an active subscription
///
/// Dropping the handle cancels the subscription. Use [`Subscription::detach`]
/// to keep the observer registered for the lifetime of the store.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: SubscriptionId,
    handlers: Weak<HandlerMap>,
    active: bool,
}

impl Subscription {
    /// The subscription identifier
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Cancel the subscription
    ///
    /// Returns true if the observer was still registered.
    pub fn unsubscribe(mut self) -> bool {
        self.cancel()
    }

    /// Keep the observer registered until the store is dropped
    pub fn detach(mut self) {
        self.active = false;
    }

    fn cancel(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;

        let Some(handlers) = self.handlers.upgrade() else {
            return false;
        };
        let removed = handlers.write().remove(&self.id).is_some();
        if removed {
            tracing::debug!("Subscription {} removed", self.id);
        }
        removed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

/// Snapshots waiting to be delivered, in apply order
#[derive(Default)]
struct PendingNotifications {
    queue: VecDeque<DeviceState>,
    /// A thread is currently calling observers
    delivering: bool,
}

/// Single source of truth for decoded device state
///
/// Observers are called after the update is complete, with a consistent
/// snapshot, and always in apply order. Only one thread delivers at a time:
/// an apply made while another delivery is running (including one made from
/// inside an observer) queues its snapshot and returns, and the delivering
/// thread passes it on before its own apply returns.
pub struct StateStore {
    /// Current state
    state: RwLock<DeviceState>,
    /// Registered observers
    handlers: Arc<HandlerMap>,
    /// Orders updates and hands snapshots to the delivering thread
    pending: Mutex<PendingNotifications>,
    /// Configuration
    config: StateStoreConfig,
}

impl StateStore {
    /// Create a new store with default configuration
    pub fn new() -> Self {
        Self::with_config(StateStoreConfig::default())
    }

    /// Create a new store with custom configuration
    pub fn with_config(config: StateStoreConfig) -> Self {
        Self {
            state: RwLock::new(DeviceState::default()),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            pending: Mutex::new(PendingNotifications::default()),
            config,
        }
    }

    /// Apply a decoded frame and notify all observers
    pub fn apply(&self, frame: Frame) {
        tracing::trace!("Applying {}", frame);
        let max_log_entries = self.config.max_log_entries;
        self.update(|state| state.apply(frame, max_log_entries));
    }

    /// Drop all log history and notify observers
    pub fn clear_log(&self) {
        self.update(|state| {
            state.log.clear();
            state.render_counter = state.render_counter.wrapping_add(1);
        });
    }

    fn update(&self, change: impl FnOnce(&mut DeviceState)) {
        let mut pending = self.pending.lock();
        let snapshot = {
            let mut state = self.state.write();
            change(&mut *state);
            state.clone()
        };
        pending.queue.push_back(snapshot);

        if pending.delivering {
            return;
        }
        pending.delivering = true;
        drop(pending);

        self.deliver();
    }

    /// Drain the queue; the flag is cleared under the same lock that pushes
    fn deliver(&self) {
        let _unwind = DeliveryGuard(&self.pending);
        loop {
            let next = {
                let mut pending = self.pending.lock();
                match pending.queue.pop_front() {
                    Some(snapshot) => snapshot,
                    None => {
                        pending.delivering = false;
                        return;
                    }
                }
            };
            self.notify(&next);
        }
    }

    /// Register an observer called after every applied frame
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&DeviceState) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.handlers.write().insert(id, Arc::new(handler));
        tracing::debug!("Subscription {} added", id);
        Subscription {
            id,
            handlers: Arc::downgrade(&self.handlers),
            active: true,
        }
    }

    /// Get the number of active subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> DeviceState {
        self.state.read().clone()
    }

    /// Latest frame for a slot
    pub fn frame(&self, kind: FrameKind) -> Option<Frame> {
        self.state.read().frame(kind).cloned()
    }

    /// Latest display board packet
    pub fn lcd(&self) -> Option<Frame> {
        self.state.read().lcd.clone()
    }

    /// Latest power board packet
    pub fn packet_buffer(&self) -> Option<Frame> {
        self.state.read().packet_buffer.clone()
    }

    /// Log history, oldest first
    pub fn log(&self) -> VecDeque<Frame> {
        self.state.read().log.clone()
    }

    /// Get the current configuration
    pub fn config(&self) -> &StateStoreConfig {
        &self.config
    }

    fn notify(&self, snapshot: &DeviceState) {
        // Handlers may unsubscribe from inside the callback.
        let handlers: Vec<StateHandler> = self.handlers.read().values().cloned().collect();
        for handler in handlers {
            handler(snapshot);
        }
    }
}

/// Releases the deliverer role if an observer panics mid-delivery
struct DeliveryGuard<'a>(&'a Mutex<PendingNotifications>);

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.lock().delivering = false;
        }
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("subscribers", &self.subscriber_count())
            .field("config", &self.config)
            .finish()
    }
}
