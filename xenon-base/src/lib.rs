//! Xenon Base - Platform capability abstraction
//!
//! The compiler and runtime never touch OS primitives directly; they consume
//! the capability set defined here. One implementation is provided per target
//! platform (`StdPlatform` for desktop). The core never branches on platform
//! identity.
//!
//! # Usage
//! ```rust,ignore
//! use xenon_base::{Platform, StdPlatform};
//!
//! let platform = StdPlatform::new();
//! let start = platform.clock().now();
//! ```

mod clock;
mod platform;
mod sync;

pub use clock::{Clock, MonotonicClock};
pub use platform::{Platform, StdPlatform};
pub use sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use std::sync::Arc;

/// Create the default platform for the current target.
pub fn std_platform() -> Arc<dyn Platform> {
    Arc::new(StdPlatform::new())
}
