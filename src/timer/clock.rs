//! Monotonic time sources for the timer.

use core::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use std::{sync::OnceLock, time::Instant};

/// A monotonic source of timestamps with millisecond precision.
pub trait Clock: Sync {
    /// Returns the current timestamp in milliseconds.
    ///
    /// The returned values must never decrease.
    fn now(&self) -> u64;

    /// Returns the current timestamp, rounded up to the next full
    /// millisecond.
    ///
    /// A deadline computed from this value never lies before the
    /// corresponding instant. Clocks without sub-millisecond precision can
    /// keep the default.
    fn now_rounded_up(&self) -> u64 {
        self.now()
    }
}

/// A [`Clock`] backed by [`std::time::Instant`].
///
/// Timestamps count the milliseconds since the clock was first queried.
#[derive(Debug, Default)]
pub struct StdClock {
    origin: OnceLock<Instant>,
}

impl StdClock {
    /// Creates a new clock
    pub const fn new() -> StdClock {
        StdClock {
            origin: OnceLock::new(),
        }
    }
}

impl Clock for StdClock {
    fn now(&self) -> u64 {
        let elapsed = self.origin.get_or_init(Instant::now).elapsed();
        u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
    }

    fn now_rounded_up(&self) -> u64 {
        let elapsed = self.origin.get_or_init(Instant::now).elapsed();
        millis_rounded_up(elapsed)
    }
}

/// Converts `duration` into milliseconds, rounding up any fraction.
pub(crate) fn millis_rounded_up(duration: Duration) -> u64 {
    let millis = (duration.as_nanos() + 999_999) / 1_000_000;
    u64::try_from(millis).unwrap_or(u64::MAX)
}

/// A [`Clock`] whose time only moves when told to.
///
/// Meant for tests which need deterministic timeouts.
#[derive(Debug, Default)]
pub struct MockClock {
    now: AtomicU64,
}

impl MockClock {
    /// Creates a new clock which starts at timestamp 0
    pub const fn new() -> MockClock {
        MockClock {
            now: AtomicU64::new(0),
        }
    }

    /// Sets the current timestamp in milliseconds
    pub fn set_time(&self, timestamp: u64) {
        self.now.store(timestamp, Ordering::SeqCst);
    }

    /// Moves the current timestamp forward by `millis`
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_partial_millis_up() {
        assert_eq!(0, millis_rounded_up(Duration::ZERO));
        assert_eq!(1, millis_rounded_up(Duration::from_nanos(1)));
        assert_eq!(1, millis_rounded_up(Duration::from_micros(900)));
        assert_eq!(2, millis_rounded_up(Duration::from_micros(1001)));
        assert_eq!(3, millis_rounded_up(Duration::from_millis(3)));
        assert_eq!(u64::MAX, millis_rounded_up(Duration::MAX));
    }
}
