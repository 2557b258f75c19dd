//! # Time Sources (utils.rs)
//!
//! Every window decision in this crate is a comparison between "now" and the
//! moment a window opened. This module owns where "now" comes from.
//!
//! ```text
//!     Clock implementations:
//!
//!     SystemClock ──► wall-clock epoch captured once at first use,
//!                     advanced by a monotonic Instant (immune to clock jumps)
//!
//!     ManualClock ──► an atomic millisecond counter you move by hand,
//!                     used to land exactly on window boundaries in tests
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

// Wall-clock epoch milliseconds at first use, advanced by a monotonic Instant.
static START_TIME_BASE: OnceLock<(Instant, u64)> = OnceLock::new();

/// Returns the current time in milliseconds since UNIX epoch.
///
/// Monotonic after the first call: if the system clock is stepped backwards
/// the returned value keeps increasing, so a window can never "un-expire".
///
/// # Example
///
/// ```rust
/// use waitlist_gate::current_time_ms;
///
/// let earlier = current_time_ms();
/// assert!(current_time_ms() >= earlier);
/// ```
#[inline]
pub fn current_time_ms() -> u64 {
    let (start, base_ms) = START_TIME_BASE.get_or_init(|| {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        (Instant::now(), epoch_ms)
    });
    base_ms.saturating_add(start.elapsed().as_millis() as u64)
}

/// A source of millisecond timestamps for window bookkeeping.
///
/// Limiters hold an `Arc<dyn Clock>` so the same limiter code runs against
/// real time in production and a hand-driven clock in tests.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time in milliseconds. Must never decrease.
    fn now_ms(&self) -> u64;
}

/// Real time, backed by [`current_time_ms`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        current_time_ms()
    }
}

/// A clock that only moves when told to.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use waitlist_gate::{Clock, ManualClock};
///
/// let clock = ManualClock::new(1_000);
/// clock.advance(Duration::from_secs(2));
/// assert_eq!(clock.now_ms(), 3_000);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// Creates a clock frozen at `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as u64, Ordering::AcqRel);
    }

    /// Moves the clock forward by a raw number of milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::AcqRel);
    }

    /// Jumps to an absolute time. Ignored if it would move the clock backwards.
    pub fn set_ms(&self, ms: u64) {
        self.now_ms.fetch_max(ms, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_time_monotonic() {
        let t1 = current_time_ms();
        thread::sleep(Duration::from_millis(5));
        let t2 = current_time_ms();
        assert!(t2 >= t1 + 5);
    }

    #[test]
    fn test_system_clock_tracks_current_time() {
        let clock = SystemClock;
        let before = current_time_ms();
        let now = clock.now_ms();
        assert!(now >= before);
    }

    #[test]
    fn test_manual_clock_moves_only_forward() {
        let clock = ManualClock::new(10_000);
        assert_eq!(clock.now_ms(), 10_000);

        clock.advance_ms(500);
        assert_eq!(clock.now_ms(), 10_500);

        clock.set_ms(9_000);
        assert_eq!(clock.now_ms(), 10_500);

        clock.set_ms(20_000);
        assert_eq!(clock.now_ms(), 20_000);
    }
}
