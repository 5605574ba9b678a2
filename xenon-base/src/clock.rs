//! Monotonic high-resolution clock capability

use std::time::{Duration, Instant};

/// Monotonic clock interface
///
/// Readings are only meaningful relative to other readings from the same
/// clock instance; they never go backwards.
pub trait Clock: Send + Sync {
    /// Elapsed time since the clock was created
    fn now(&self) -> Duration;
}

/// Standard-library monotonic clock, anchored at construction time.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_monotonic() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
