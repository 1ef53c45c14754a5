//! # DelonghiKit Core
//!
//! Core types for DelonghiKit.
//! Provides the error taxonomy, decoded frames, the appliance packet model
//! and the reactive state store shared by the protocol engine and its
//! consumers.

pub mod error;
pub mod frame;
pub mod packet;
pub mod state;
pub mod types;

pub use error::{CodecError, EngineError, Error, Result, TransportError};

pub use frame::{Frame, FrameKind};

pub use packet::{DevicePacket, ProtocolVersion};

pub use state::{
    ChecksumErrors, DeviceState, StateStore, StateStoreConfig, Subscription, SubscriptionId,
};

pub use types::{thread_safe, thread_safe_none, ThreadSafe, ThreadSafeOption};
