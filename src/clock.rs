//! Wall-clock abstraction
//!
//! The sampler reads time only when it is called, so swapping the clock is
//! all it takes to drive window rollover deterministically in tests.

use crate::sampler::duration_to_millis;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the current time in milliseconds
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Real wall clock (milliseconds since the Unix epoch)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        // A clock set before the epoch reads as the epoch itself
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(duration_to_millis)
            .unwrap_or(0)
    }
}

/// Virtual clock shared between handles
///
/// Cloning yields another handle onto the same time, so a test can keep one
/// handle and move the other into a sampler.
#[derive(Debug, Clone, Default)]
pub struct SimulatedClock {
    now: Arc<AtomicU64>,
}

impl SimulatedClock {
    pub fn new(start_ms: u64) -> Self {
        SimulatedClock {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        let by = duration_to_millis(by);
        // Saturate instead of wrapping past u64::MAX
        let _ = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(by))
            });
    }
}

impl Clock for SimulatedClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_clock_shared_between_handles() {
        let clock = SimulatedClock::new(100);
        let handle = clock.clone();

        handle.advance(Duration::from_millis(50));
        assert_eq!(clock.now_ms(), 150);

        clock.set(5_000);
        assert_eq!(handle.now_ms(), 5_000);
    }

    #[test]
    fn test_simulated_clock_advance_saturates() {
        let clock = SimulatedClock::new(u64::MAX - 10);
        clock.advance(Duration::from_millis(100));
        assert_eq!(clock.now_ms(), u64::MAX);

        let clock = SimulatedClock::new(0);
        clock.advance(Duration::MAX);
        assert_eq!(clock.now_ms(), u64::MAX);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now_ms() > 1_577_836_800_000);
    }
}
