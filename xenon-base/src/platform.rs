//! Platform trait and the standard-library implementation

use crate::clock::{Clock, MonotonicClock};
use std::thread;

/// Handle to a spawned native thread.
pub struct ThreadHandle {
    inner: thread::JoinHandle<i32>,
}

impl ThreadHandle {
    /// Block until the thread finishes and return its exit value.
    pub fn join(self) -> i32 {
        match self.inner.join() {
            Ok(code) => code,
            Err(_) => panic!("xenon-base: joined thread panicked"),
        }
    }
}

/// Platform capability set consumed by the XenonScript core.
///
/// A host may run multiple independent VM instances on threads spawned
/// through this interface; the VM itself never spawns threads.
pub trait Platform: Send + Sync {
    /// Spawn a named native thread running `entry`.
    fn spawn_thread(&self, name: &str, entry: Box<dyn FnOnce() -> i32 + Send>) -> ThreadHandle;

    /// The platform's monotonic clock.
    fn clock(&self) -> &dyn Clock;
}

/// Desktop implementation over `std::thread` / `std::time`.
pub struct StdPlatform {
    clock: MonotonicClock,
}

impl StdPlatform {
    pub fn new() -> Self {
        Self {
            clock: MonotonicClock::new(),
        }
    }
}

impl Default for StdPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for StdPlatform {
    fn spawn_thread(&self, name: &str, entry: Box<dyn FnOnce() -> i32 + Send>) -> ThreadHandle {
        let inner = thread::Builder::new()
            .name(name.to_string())
            .spawn(entry)
            .unwrap_or_else(|e| panic!("xenon-base: failed to spawn thread {}: {}", name, e));
        ThreadHandle { inner }
    }

    fn clock(&self) -> &dyn Clock {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_and_join() {
        let platform = StdPlatform::new();
        let handle = platform.spawn_thread("worker", Box::new(|| 7));
        assert_eq!(handle.join(), 7);
    }

    #[test]
    fn test_clock_accessible() {
        let platform = StdPlatform::new();
        let t = platform.clock().now();
        assert!(t.as_nanos() < u128::MAX);
    }
}
