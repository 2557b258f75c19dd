//! # Limiter Metrics
//!
//! Counters kept alongside each axis, and the snapshots built from them.
//!
//! ```text
//!     LimiterMetrics
//!     ├─ ip:    AxisMetrics { admitted, denied, released, tracked_keys }
//!     └─ email: AxisMetrics { ... }
//!                      │
//!                      ▼
//!               HealthStatus ── Healthy / Degraded / Critical
//! ```
//!
//! "Released" counts admissions handed back because the other axis denied
//! the same attempt; see `dual.rs`.

use super::config::Axis;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one axis. Relaxed ordering: these are statistics, never
/// inputs to a decision.
#[derive(Debug, Default)]
pub(crate) struct AxisCounters {
    admitted: AtomicU64,
    denied: AtomicU64,
    released: AtomicU64,
}

impl AxisCounters {
    #[inline]
    pub(crate) fn record_admit(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_deny(&self) {
        self.denied.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_release(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(
        &self,
        axis: Axis,
        tracked_keys: usize,
        max_tracked_keys: usize,
    ) -> AxisMetrics {
        AxisMetrics {
            axis,
            total_admitted: self.admitted.load(Ordering::Relaxed),
            total_denied: self.denied.load(Ordering::Relaxed),
            total_released: self.released.load(Ordering::Relaxed),
            tracked_keys,
            max_tracked_keys,
        }
    }
}

/// Point-in-time metrics for one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisMetrics {
    /// Which key-space these numbers describe.
    pub axis: Axis,

    /// Attempts admitted (including ones later released).
    pub total_admitted: u64,

    /// Attempts denied by this axis.
    pub total_denied: u64,

    /// Admissions given back after the other axis denied the attempt.
    pub total_released: u64,

    /// Keys currently holding a counter.
    pub tracked_keys: usize,

    /// Key capacity of the axis.
    pub max_tracked_keys: usize,
}

impl AxisMetrics {
    /// Attempts that reached a decision on this axis.
    #[inline]
    pub fn total_checked(&self) -> u64 {
        self.total_admitted + self.total_denied
    }

    /// Fraction of checks admitted, 1.0 before any traffic.
    #[inline]
    pub fn success_rate(&self) -> f64 {
        let total = self.total_checked();
        if total == 0 {
            1.0
        } else {
            self.total_admitted as f64 / total as f64
        }
    }

    /// Fraction of checks denied.
    #[inline]
    pub fn rejection_rate(&self) -> f64 {
        1.0 - self.success_rate()
    }

    /// Fraction of key capacity in use (0.0 to 1.0).
    #[inline]
    pub fn capacity_used(&self) -> f64 {
        if self.max_tracked_keys == 0 {
            0.0
        } else {
            self.tracked_keys as f64 / self.max_tracked_keys as f64
        }
    }

    /// Health of this axis.
    ///
    /// - **Critical**: key capacity exhausted, so new keys are being refused
    /// - **Degraded**: above 80% of capacity, or more than half of checks denied
    /// - **Healthy**: anything else
    pub fn health_status(&self) -> HealthStatus {
        if self.tracked_keys >= self.max_tracked_keys {
            HealthStatus::Critical
        } else if self.capacity_used() > 0.8 || self.rejection_rate() > 0.5 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Snapshot of both axes. A disabled axis is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterMetrics {
    /// Per-IP axis.
    pub ip: Option<AxisMetrics>,

    /// Per-email axis.
    pub email: Option<AxisMetrics>,
}

impl LimiterMetrics {
    /// Denials across both axes.
    pub fn total_denied(&self) -> u64 {
        self.axes().map(|m| m.total_denied).sum()
    }

    /// Worst health among the enabled axes. `Healthy` when both are disabled.
    pub fn health_status(&self) -> HealthStatus {
        self.axes()
            .map(AxisMetrics::health_status)
            .max()
            .unwrap_or(HealthStatus::Healthy)
    }

    fn axes(&self) -> impl Iterator<Item = &AxisMetrics> {
        self.ip.iter().chain(self.email.iter())
    }

    /// Human-readable report, one block per axis.
    ///
    /// # Example Output
    ///
    /// ```text
    /// Submission Limiter Metrics:
    /// ├─ ip: admitted 12, denied 3, released 1, keys 7/100000 (80.00% success)
    /// ├─ email: disabled
    /// └─ Health: Healthy
    /// ```
    pub fn summary(&self) -> String {
        fn line(axis: Axis, metrics: Option<&AxisMetrics>) -> String {
            match metrics {
                Some(m) => format!(
                    "{}: admitted {}, denied {}, released {}, keys {}/{} ({:.2}% success)",
                    axis,
                    m.total_admitted,
                    m.total_denied,
                    m.total_released,
                    m.tracked_keys,
                    m.max_tracked_keys,
                    m.success_rate() * 100.0
                ),
                None => format!("{}: disabled", axis),
            }
        }

        format!(
            "Submission Limiter Metrics:\n\
             ├─ {}\n\
             ├─ {}\n\
             └─ Health: {:?}",
            line(Axis::Ip, self.ip.as_ref()),
            line(Axis::Email, self.email.as_ref()),
            self.health_status()
        )
    }
}

impl fmt::Display for LimiterMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Three-level health indicator. Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
    /// Normal operation.
    Healthy,
    /// Close to key capacity, or most traffic is being denied.
    Degraded,
    /// Key capacity exhausted; unseen callers are refused.
    Critical,
}

impl HealthStatus {
    /// `true` for anything but `Healthy`.
    pub fn is_unhealthy(&self) -> bool {
        !matches!(self, Self::Healthy)
    }

    /// Lower-case label for JSON and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Critical => "critical",
        }
    }
}
