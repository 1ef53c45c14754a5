//! # State Module
//!
//! Holds the latest decoded device state and notifies observers on change.
//!
//! ## Usage
//!
//! ```rust
//! use delonghikit_core::{Frame, FrameKind, StateStore};
//!
//! let store = StateStore::new();
//! let subscription = store.subscribe(|state| {
//!     if let Some(lcd) = &state.lcd {
//!         println!("LCD: {}", lcd.raw_hex());
//!     }
//! });
//!
//! store.apply(Frame::new(FrameKind::Log, b"Init'd".to_vec()));
//! assert_eq!(store.log().len(), 1);
//!
//! subscription.unsubscribe();
//! ```

mod device;
mod store;

pub use device::*;
pub use store::*;
