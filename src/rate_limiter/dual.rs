//! # Dual-Axis Admission
//!
//! Every submission is checked against two independent key-spaces, in a
//! fixed order:
//!
//! ```text
//!     attempt(source, email)
//!          │
//!          ▼
//!     ┌──────────┐  deny   ┌──────────────────────────────┐
//!     │ ip axis  │ ──────► │ RateLimited(ip)              │  email axis untouched
//!     └────┬─────┘         └──────────────────────────────┘
//!          │ admit
//!          ▼
//!     ┌──────────┐  deny   ┌──────────────────────────────┐
//!     │email axis│ ──────► │ RateLimited(email)           │  ip admission released
//!     └────┬─────┘         └──────────────────────────────┘
//!          │ admit
//!          ▼
//!      Admission (counted on both axes)
//! ```
//!
//! A rate-limited attempt therefore never consumes quota on either axis,
//! while every admitted attempt consumes one slot on each enabled axis no
//! matter what happens to it afterwards.

use super::{
    config::{Axis, RateLimitPolicy},
    core::Decision,
    manager::KeyedLimiter,
    metrics::LimiterMetrics,
    utils::Clock,
};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Proof that an attempt was admitted on every enabled axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Attempts used on the IP axis in the current window, if enabled.
    pub ip_count: Option<u32>,
    /// Attempts used on the email axis in the current window, if enabled.
    pub email_count: Option<u32>,
}

/// An attempt refused by one of the axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    /// The axis that refused the attempt.
    pub axis: Axis,
    /// Milliseconds until that axis' window rolls over.
    pub retry_after_ms: u64,
}

/// Normalises an email into its rate-limit key.
///
/// Trimmed and lower-cased, so `" A@B.com"` and `"a@b.com"` share a quota.
#[inline]
pub fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

/// IP-then-email limiter. Either axis can be switched off by the policy.
#[derive(Debug, Clone)]
pub struct DualAxisLimiter {
    by_ip: Option<Arc<KeyedLimiter>>,
    by_email: Option<Arc<KeyedLimiter>>,
    cleanup_interval_ms: u64,
}

impl DualAxisLimiter {
    /// Builds both axes from `policy`.
    ///
    /// # Errors
    ///
    /// Returns the validation message if the policy is invalid.
    pub fn new(policy: &RateLimitPolicy, clock: Arc<dyn Clock>) -> Result<Self, &'static str> {
        policy.validate()?;

        let build = |axis: Axis| {
            policy.window(axis).map(|window| {
                Arc::new(KeyedLimiter::new(
                    axis,
                    window,
                    policy.max_tracked_keys,
                    clock.clone(),
                ))
            })
        };

        Ok(Self {
            by_ip: build(Axis::Ip),
            by_email: build(Axis::Email),
            cleanup_interval_ms: policy.cleanup_interval_ms,
        })
    }

    /// Checks `source` on the IP axis, then `email` on the email axis.
    pub fn check(&self, source: &str, email: &str) -> Result<Admission, RateLimited> {
        let mut ip_window = None;

        if let Some(limiter) = &self.by_ip {
            match limiter.check(source) {
                Decision::Admitted {
                    count,
                    window_start_ms,
                } => ip_window = Some((count, window_start_ms)),
                Decision::Denied { retry_after_ms } => {
                    debug!(source, "Attempt rate limited on ip axis");
                    return Err(RateLimited {
                        axis: Axis::Ip,
                        retry_after_ms,
                    });
                }
            }
        }

        let mut email_count = None;

        if let Some(limiter) = &self.by_email {
            let key = email_key(email);
            match limiter.check(&key) {
                Decision::Admitted { count, .. } => email_count = Some(count),
                Decision::Denied { retry_after_ms } => {
                    // Denied attempts consume nothing: hand the ip slot back
                    if let (Some(ip), Some((_, window_start_ms))) = (&self.by_ip, ip_window) {
                        ip.release(source, window_start_ms);
                    }
                    debug!(source, "Attempt rate limited on email axis");
                    return Err(RateLimited {
                        axis: Axis::Email,
                        retry_after_ms,
                    });
                }
            }
        }

        Ok(Admission {
            ip_count: ip_window.map(|(count, _)| count),
            email_count,
        })
    }

    /// Limiter for one axis, if enabled.
    pub fn axis(&self, axis: Axis) -> Option<&KeyedLimiter> {
        match axis {
            Axis::Ip => self.by_ip.as_deref(),
            Axis::Email => self.by_email.as_deref(),
        }
    }

    /// Drops expired windows on both axes. Returns how many were removed.
    pub fn cleanup(&self) -> u64 {
        self.by_ip.iter().chain(self.by_email.iter()).map(|l| l.cleanup()).sum()
    }

    /// Metrics for both axes.
    pub fn metrics(&self) -> LimiterMetrics {
        LimiterMetrics {
            ip: self.by_ip.as_ref().map(|l| l.metrics()),
            email: self.by_email.as_ref().map(|l| l.metrics()),
        }
    }

    /// Starts a named thread that sweeps expired windows every
    /// `cleanup_interval_ms` until a value is sent on (or the sender for)
    /// the returned channel is dropped.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread could not be spawned.
    pub fn start_stoppable_cleanup_thread(
        &self,
    ) -> std::io::Result<(thread::JoinHandle<()>, mpsc::Sender<()>)> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let limiter = self.clone();
        let interval = Duration::from_millis(self.cleanup_interval_ms);

        let handle = thread::Builder::new()
            .name("waitlist-cleanup".to_string())
            .spawn(move || {
                info!(interval_ms = interval.as_millis() as u64, "Started cleanup thread");

                loop {
                    match stop_rx.recv_timeout(interval) {
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                            info!("Cleanup thread stopping");
                            break;
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            let removed = limiter.cleanup();
                            let metrics = limiter.metrics();
                            debug!(removed, "Periodic cleanup finished");

                            if metrics.health_status().is_unhealthy() {
                                warn!("{}", metrics.summary());
                            }
                        }
                    }
                }
            })?;

        Ok((handle, stop_tx))
    }
}
