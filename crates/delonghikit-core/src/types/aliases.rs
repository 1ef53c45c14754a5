//! Type aliases for commonly used complex types.
//!
//! Complex types like `Arc<Mutex<Option<Box<dyn Transport>>>>` are hard to
//! read at a glance. The aliases here give them meaningful names.
//!
//! ## Usage
//!
//! ```rust
//! use delonghikit_core::types::*;
//!
//! // Instead of: Arc<Mutex<Vec<u8>>>
//! let written: ThreadSafe<Vec<u8>> = thread_safe(Vec::new());
//! written.lock().push(0xAA);
//! ```

use parking_lot::Mutex;
use std::sync::Arc;

/// A thread-safe, mutex-protected wrapper for cross-thread sharing.
///
/// Uses `parking_lot::Mutex` for better performance than `std::sync::Mutex`.
pub type ThreadSafe<T> = Arc<Mutex<T>>;

/// A thread-safe optional wrapper for lazily-initialized cross-thread state.
pub type ThreadSafeOption<T> = Arc<Mutex<Option<T>>>;

/// Create a new `ThreadSafe<T>` from a value.
#[inline]
pub fn thread_safe<T>(value: T) -> ThreadSafe<T> {
    Arc::new(Mutex::new(value))
}

/// Create a new `ThreadSafeOption<T>` initialized to `None`.
#[inline]
pub fn thread_safe_none<T>() -> ThreadSafeOption<T> {
    Arc::new(Mutex::new(None))
}
