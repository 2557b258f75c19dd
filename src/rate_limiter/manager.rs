//! # Keyed Fixed-Window Limiter
//!
//! One [`KeyedLimiter`] per axis. It maps a key (a client address or a
//! normalised email) to its [`FixedWindowCounter`] and makes every decision
//! for that key while holding the key's map entry.
//!
//! ## Architecture
//!
//! ```text
//!     Attempts:
//!     1.1.1.1 ──┐
//!     2.2.2.2 ──┼──► KeyedLimiter(ip) ──► DashMap<key, counter>
//!     1.1.1.1 ──┘           │               ┌───────────────────┐
//!                           │               │ shard 0: k → ctr  │ ◄─ write guard held
//!                           ▼               │ shard 1: k → ctr  │    for check()
//!                       Decision            │ ...               │
//!                                           └───────────────────┘
//! ```
//!
//! ## Key Properties
//!
//! 1. **Per-key critical section**: two concurrent attempts for the same key
//!    are serialised by the shard lock, so they can never both take the last slot
//! 2. **Independent keys**: different keys on different shards never contend
//! 3. **Bounded memory**: at most `max_tracked_keys` counters exist per axis
//! 4. **Invisible eviction**: only counters whose window has elapsed are ever
//!    removed, and an elapsed counter would have been reset on its next check
//!    anyway, so eviction can not change a decision
//! 5. **Fail closed**: when capacity is exhausted by live windows, unseen keys
//!    are denied instead of evicting someone else's live quota

use super::{
    config::{Axis, WindowConfig},
    core::{Decision, FixedWindowCounter},
    metrics::{AxisCounters, AxisMetrics},
    utils::Clock,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fraction (percent) of capacity at which inserting a new key first sweeps
/// expired counters.
const CLEANUP_THRESHOLD_PERCENT: usize = 90;

/// Rate limiter for one key-space.
///
/// ## Example
///
/// ```rust
/// use std::sync::Arc;
/// use waitlist_gate::{Axis, KeyedLimiter, ManualClock, WindowConfig};
///
/// let clock = Arc::new(ManualClock::new(0));
/// let limiter = KeyedLimiter::new(Axis::Ip, WindowConfig::new(2, 1000), 1000, clock.clone());
///
/// assert!(limiter.check("1.1.1.1").is_admitted());
/// assert!(limiter.check("1.1.1.1").is_admitted());
/// assert!(!limiter.check("1.1.1.1").is_admitted());
///
/// clock.advance_ms(1001);
/// assert!(limiter.check("1.1.1.1").is_admitted());
/// ```
pub struct KeyedLimiter {
    /// Which axis this limiter enforces (for logs and metrics).
    axis: Axis,

    /// Admission policy shared by every key.
    window: WindowConfig,

    /// Key to counter. DashMap shards the map, each shard behind its own lock.
    counters: Arc<DashMap<String, FixedWindowCounter, ahash::RandomState>>,

    /// Number of live counters, kept alongside the map for O(1) capacity checks.
    active_count: Arc<AtomicUsize>,

    /// Upper bound on live counters.
    max_tracked_keys: usize,

    /// Source of "now".
    clock: Arc<dyn Clock>,

    /// Admitted / denied / released tallies.
    counts: Arc<AxisCounters>,

    /// Counters created since startup.
    total_created: Arc<AtomicU64>,

    /// Counters evicted since startup.
    total_cleaned: Arc<AtomicU64>,

    /// Prevents concurrent emergency sweeps.
    cleanup_in_progress: Arc<AtomicBool>,
}

impl KeyedLimiter {
    /// Creates a limiter for `axis` with room for `max_tracked_keys` keys.
    ///
    /// # Panics
    ///
    /// Panics if `window` is invalid (see [`WindowConfig::validate`]).
    pub fn new(
        axis: Axis,
        window: WindowConfig,
        max_tracked_keys: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        if let Err(reason) = window.validate() {
            panic!("invalid {axis} window configuration: {reason}");
        }

        // More shards = less contention but more memory overhead.
        // DashMap requires a power of two greater than one.
        let num_shards = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8)
            .next_power_of_two()
            .clamp(4, 64);

        let initial_capacity = (max_tracked_keys / num_shards).clamp(16, 1024);

        Self {
            axis,
            window,
            counters: Arc::new(DashMap::with_capacity_and_hasher_and_shard_amount(
                initial_capacity,
                ahash::RandomState::new(),
                num_shards,
            )),
            active_count: Arc::new(AtomicUsize::new(0)),
            max_tracked_keys: max_tracked_keys.max(1),
            clock,
            counts: Arc::new(AxisCounters::default()),
            total_created: Arc::new(AtomicU64::new(0)),
            total_cleaned: Arc::new(AtomicU64::new(0)),
            cleanup_in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Axis enforced by this limiter.
    #[inline]
    pub fn axis(&self) -> Axis {
        self.axis
    }

    /// Policy enforced by this limiter.
    #[inline]
    pub fn window(&self) -> WindowConfig {
        self.window
    }

    /// Runs one admission check for `key`.
    ///
    /// Admitted attempts are counted; denied ones are not.
    pub fn check(&self, key: &str) -> Decision {
        let now = self.clock.now_ms();

        // Fast path: the key already has a counter.
        // The shard write guard lives until the end of this block.
        if let Some(mut counter) = self.counters.get_mut(key) {
            let decision = counter.check(now, &self.window);
            drop(counter);
            return self.record(key, decision);
        }

        // Slow path: a new key needs a slot
        let threshold = self.max_tracked_keys * CLEANUP_THRESHOLD_PERCENT / 100;
        if self.active_count.load(Ordering::Acquire) >= threshold {
            self.emergency_cleanup(now);
        }

        match self.counters.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                // Another thread created it while we were checking
                let decision = occupied.get_mut().check(now, &self.window);
                drop(occupied);
                self.record(key, decision)
            }
            Entry::Vacant(vacant) => {
                let prev = self.active_count.fetch_add(1, Ordering::AcqRel);
                if prev >= self.max_tracked_keys {
                    self.active_count.fetch_sub(1, Ordering::AcqRel);
                    warn!(
                        axis = %self.axis,
                        tracked = prev,
                        "Rate limiter capacity reached, refusing new key"
                    );
                    return self.record(
                        key,
                        Decision::Denied {
                            retry_after_ms: self.window.window_ms,
                        },
                    );
                }

                vacant.insert(FixedWindowCounter::open(now));
                self.total_created.fetch_add(1, Ordering::Relaxed);
                debug!(axis = %self.axis, total = prev + 1, "Opened window for new key");

                self.record(
                    key,
                    Decision::Admitted {
                        count: 1,
                        window_start_ms: now,
                    },
                )
            }
        }
    }

    fn record(&self, key: &str, decision: Decision) -> Decision {
        match decision {
            Decision::Admitted { .. } => self.counts.record_admit(),
            Decision::Denied { retry_after_ms } => {
                self.counts.record_deny();
                debug!(axis = %self.axis, key, retry_after_ms, "Attempt denied");
            }
        }
        decision
    }

    /// Hands back an admission made in the window that opened at
    /// `window_start_ms`. No-op if that window has since rolled over.
    pub fn release(&self, key: &str, window_start_ms: u64) -> bool {
        let released = self
            .counters
            .get_mut(key)
            .map(|mut counter| counter.release(window_start_ms))
            .unwrap_or(false);

        if released {
            self.counts.record_release();
        }
        released
    }

    /// Attempts counted for `key` in its current window, if it is tracked.
    pub fn current_count(&self, key: &str) -> Option<u32> {
        self.counters.get(key).map(|counter| counter.count())
    }

    /// Removes every counter whose window has elapsed.
    ///
    /// Returns the number of counters removed.
    pub fn cleanup(&self) -> u64 {
        let now = self.clock.now_ms();
        let removed = self.remove_expired(now);

        if removed > 0 {
            debug!(axis = %self.axis, removed, "Cleanup removed expired windows");
        }

        self.shrink_to_fit();
        removed
    }

    /// Sweep triggered from the insert path when close to capacity.
    fn emergency_cleanup(&self, now: u64) {
        if self
            .cleanup_in_progress
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        let _guard = CleanupGuard {
            flag: &self.cleanup_in_progress,
        };

        let before = self.active_count.load(Ordering::Acquire);
        info!(axis = %self.axis, tracked = before, "Starting emergency cleanup");

        let removed = self.remove_expired(now);
        let after = self.active_count.load(Ordering::Acquire);

        if after >= self.max_tracked_keys {
            warn!(
                axis = %self.axis,
                removed,
                tracked = after,
                "Emergency cleanup found no room, live windows fill the limiter"
            );
        } else {
            info!(axis = %self.axis, removed, tracked = after, "Emergency cleanup finished");
        }
    }

    fn remove_expired(&self, now: u64) -> u64 {
        let mut removed = 0;
        self.counters.retain(|_, counter| {
            if counter.is_expired(now, &self.window) {
                removed += 1;
                self.active_count.fetch_sub(1, Ordering::AcqRel);
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.total_cleaned.fetch_add(removed, Ordering::Relaxed);
        }
        removed
    }

    /// Shrinks the map if it has significant overcapacity.
    pub fn shrink_to_fit(&self) {
        let current_size = self.active_count.load(Ordering::Acquire);
        let capacity = self.counters.capacity();

        if capacity > current_size * 4 && capacity > 1024 {
            self.counters.shrink_to_fit();
            debug!(axis = %self.axis, from = capacity, to = current_size, "Shrunk counter map");
        }
    }

    /// Number of keys currently holding a counter.
    #[inline]
    pub fn active_keys(&self) -> usize {
        self.active_count.load(Ordering::Acquire)
    }

    /// Drops every counter.
    pub fn clear(&self) {
        let count = self.counters.len();
        self.counters.clear();
        self.active_count.store(0, Ordering::Release);
        self.total_cleaned.fetch_add(count as u64, Ordering::Relaxed);
        info!(axis = %self.axis, count, "Cleared all rate limit windows");
    }

    /// Decision tallies and key usage.
    pub fn metrics(&self) -> AxisMetrics {
        self.counts
            .snapshot(self.axis, self.active_keys(), self.max_tracked_keys)
    }

    /// Key-space lifecycle statistics.
    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            axis: self.axis,
            active_keys: self.active_keys(),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_cleaned: self.total_cleaned.load(Ordering::Relaxed),
            capacity_used: self.active_keys() as f64 / self.max_tracked_keys as f64,
            max_capacity: self.max_tracked_keys,
        }
    }
}

impl std::fmt::Debug for KeyedLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedLimiter")
            .field("axis", &self.axis)
            .field("window", &self.window)
            .field("active_keys", &self.active_keys())
            .field("max_tracked_keys", &self.max_tracked_keys)
            .finish()
    }
}

/// Resets the emergency-cleanup flag on every exit path.
struct CleanupGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> Drop for CleanupGuard<'a> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Lifecycle statistics for one axis.
#[derive(Debug, Clone)]
pub struct ManagerStats {
    /// Axis described.
    pub axis: Axis,

    /// Keys currently tracked.
    pub active_keys: usize,

    /// Counters created since startup.
    pub total_created: u64,

    /// Counters evicted since startup.
    pub total_cleaned: u64,

    /// Fraction of capacity in use (0.0 to 1.0).
    pub capacity_used: f64,

    /// Maximum number of keys that can be tracked.
    pub max_capacity: usize,
}

impl ManagerStats {
    /// Human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} limiter: {}/{} keys ({:.2}% used), {} created, {} cleaned",
            self.axis,
            self.active_keys,
            self.max_capacity,
            self.capacity_used * 100.0,
            self.total_created,
            self.total_cleaned
        )
    }

    /// `true` when more than 80% of capacity is in use.
    pub fn is_near_capacity(&self) -> bool {
        self.capacity_used > 0.8
    }
}

impl std::fmt::Display for ManagerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.summary())
    }
}
