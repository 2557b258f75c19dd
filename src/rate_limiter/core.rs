//! # Fixed Window Counter
//!
//! The decision procedure for a single key. It is deliberately plain data:
//! the caller (see `manager.rs`) is responsible for holding the per-key lock
//! while `check` runs, so the read-check-write below is one critical section.
//!
//! ## Algorithm
//!
//! ```text
//!     check(now):
//!
//!     now - start > window ? ──Yes──► count = 1, start = now ──► ✅ admit
//!              │
//!              No
//!              ▼
//!     count >= max ? ──Yes──► ❌ deny (count unchanged)
//!              │
//!              No
//!              ▼
//!     count += 1 ──► ✅ admit
//! ```
//!
//! A key seen for the first time is simply a fresh counter, see
//! [`FixedWindowCounter::open`].
//!
//! ## Boundary Burst
//!
//! Windows are fixed, not sliding. A caller who spends all `N` attempts just
//! before a window closes gets `N` more right after it: up to `2N`
//! admissions in a short span. That is the accepted cost of O(1) state.
//!
//! ## Release
//!
//! [`FixedWindowCounter::release`] is the one place a count goes down. The
//! dual-axis check admits on the IP axis before it knows the email verdict,
//! and an email denial must not cost the IP anything. So within a window the
//! count only grows, except that an admission refused by a later axis is
//! handed back. A release never spans windows and never takes the count
//! below zero.

use super::config::WindowConfig;

/// Outcome of a single counter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The attempt was admitted and counted.
    Admitted {
        /// Attempts used in the current window, including this one.
        count: u32,
        /// Start of the window the attempt was counted in.
        window_start_ms: u64,
    },
    /// The window is full. Nothing was counted.
    Denied {
        /// Milliseconds until the window rolls over.
        retry_after_ms: u64,
    },
}

impl Decision {
    /// `true` for [`Decision::Admitted`].
    #[inline]
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }
}

/// `{count, windowStart}` for one tracked key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindowCounter {
    count: u32,
    window_start_ms: u64,
}

impl FixedWindowCounter {
    /// A counter for a key seen for the first time: one attempt, window open now.
    #[inline]
    pub fn open(now_ms: u64) -> Self {
        Self {
            count: 1,
            window_start_ms: now_ms,
        }
    }

    /// Attempts counted in the current window.
    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// When the current window opened.
    #[inline]
    pub fn window_start_ms(&self) -> u64 {
        self.window_start_ms
    }

    /// Whether the window has elapsed at `now_ms`.
    ///
    /// The boundary itself still belongs to the old window: a counter opened
    /// at `T` is expired at `T + W + 1`, not at `T + W`.
    #[inline]
    pub fn is_expired(&self, now_ms: u64, config: &WindowConfig) -> bool {
        now_ms.saturating_sub(self.window_start_ms) > config.window_ms
    }

    /// Runs one admission check, mutating the counter.
    pub fn check(&mut self, now_ms: u64, config: &WindowConfig) -> Decision {
        if self.is_expired(now_ms, config) {
            *self = Self::open(now_ms);
            return Decision::Admitted {
                count: 1,
                window_start_ms: now_ms,
            };
        }

        if self.count >= config.max_attempts {
            let window_end = self.window_start_ms.saturating_add(config.window_ms);
            return Decision::Denied {
                // +1: the boundary millisecond still belongs to this window
                retry_after_ms: window_end.saturating_sub(now_ms) + 1,
            };
        }

        self.count += 1;
        Decision::Admitted {
            count: self.count,
            window_start_ms: self.window_start_ms,
        }
    }

    /// Gives back one admission made in the window that opened at
    /// `window_start_ms`.
    ///
    /// Returns `false` (and does nothing) if the window has since been
    /// replaced or nothing is left to give back.
    pub fn release(&mut self, window_start_ms: u64) -> bool {
        if self.window_start_ms != window_start_ms || self.count == 0 {
            return false;
        }
        self.count -= 1;
        true
    }
}
