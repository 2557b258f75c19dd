//! # Rate Limiter Configuration
//!
//! Two knobs per axis and a handful of housekeeping settings.
//!
//! ## Fixed Windows
//!
//! ```text
//!     WindowConfig { max_attempts: 3, window_ms: 24h }
//!
//!     t0          t0 + 24h (inclusive)       t0 + 24h + 1ms
//!     ├──── admit, admit, admit, deny... ────┤├── fresh window ──►
//!     │         count: 1 → 2 → 3 (held)      ││  count: 1
//! ```
//!
//! A window opens on the first attempt for a key, not on a wall-clock
//! boundary, and it is replaced wholesale once `now - start > window_ms`.
//!
//! ## Axes
//!
//! ```text
//!     RateLimitPolicy
//!     ├─ by_ip:    Some(3 / 24h)   ◄── None switches the axis off
//!     └─ by_email: Some(5 / 1h)
//! ```

/// One hour in milliseconds.
pub const HOUR_MS: u64 = 60 * 60 * 1000;

/// One day in milliseconds.
pub const DAY_MS: u64 = 24 * HOUR_MS;

/// Default cap on the number of keys each axis tracks at once.
pub const DEFAULT_MAX_TRACKED_KEYS: usize = 100_000;

/// Default interval between background sweeps of expired counters.
pub const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 5 * 60 * 1000;

/// Admission policy for a single axis.
///
/// ## Examples
///
/// ```rust
/// use waitlist_gate::WindowConfig;
///
/// let per_ip = WindowConfig::per_day(3);
/// let per_email = WindowConfig::per_hour(5);
/// assert!(per_ip.validate().is_ok());
/// assert_eq!(per_email.window_ms, 3_600_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Admitted attempts allowed inside one window.
    pub max_attempts: u32,

    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl WindowConfig {
    /// Creates a window of `window_ms` admitting `max_attempts`.
    pub fn new(max_attempts: u32, window_ms: u64) -> Self {
        Self {
            max_attempts,
            window_ms,
        }
    }

    /// `max_attempts` per rolling hour.
    pub fn per_hour(max_attempts: u32) -> Self {
        Self::new(max_attempts, HOUR_MS)
    }

    /// `max_attempts` per rolling day.
    pub fn per_day(max_attempts: u32) -> Self {
        Self::new(max_attempts, DAY_MS)
    }

    /// Checks that the window can ever admit anything.
    ///
    /// # Errors
    ///
    /// Returns an error message if `max_attempts` or `window_ms` is 0.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0");
        }
        if self.window_ms == 0 {
            return Err("window_ms must be greater than 0");
        }
        Ok(())
    }
}

/// Which key-space a decision was made in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Originating network address of the caller.
    Ip,
    /// Normalised email address being submitted.
    Email,
}

impl Axis {
    /// Short label used in logs and stats.
    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::Ip => "ip",
            Axis::Email => "email",
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combined policy for both axes plus housekeeping.
///
/// The default reproduces the strictest observed deployment: 3 attempts per
/// IP per day and 5 attempts per email per hour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Per-IP policy. `None` disables the axis.
    pub by_ip: Option<WindowConfig>,

    /// Per-email policy. `None` disables the axis.
    pub by_email: Option<WindowConfig>,

    /// Upper bound on simultaneously tracked keys, per axis.
    pub max_tracked_keys: usize,

    /// How often the background sweeper drops expired counters.
    pub cleanup_interval_ms: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            by_ip: Some(WindowConfig::per_day(3)),
            by_email: Some(WindowConfig::per_hour(5)),
            max_tracked_keys: DEFAULT_MAX_TRACKED_KEYS,
            cleanup_interval_ms: DEFAULT_CLEANUP_INTERVAL_MS,
        }
    }
}

impl RateLimitPolicy {
    /// A policy with both axes switched off. Every attempt is admitted.
    pub fn unlimited() -> Self {
        Self {
            by_ip: None,
            by_email: None,
            ..Default::default()
        }
    }

    /// Replaces the per-IP policy.
    pub fn with_ip(mut self, window: Option<WindowConfig>) -> Self {
        self.by_ip = window;
        self
    }

    /// Replaces the per-email policy.
    pub fn with_email(mut self, window: Option<WindowConfig>) -> Self {
        self.by_email = window;
        self
    }

    /// Replaces the per-axis key capacity.
    pub fn with_max_tracked_keys(mut self, max: usize) -> Self {
        self.max_tracked_keys = max;
        self
    }

    /// Returns the window for an axis, if enabled.
    pub fn window(&self, axis: Axis) -> Option<WindowConfig> {
        match axis {
            Axis::Ip => self.by_ip,
            Axis::Email => self.by_email,
        }
    }

    /// Validates both axes and the housekeeping settings.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), &'static str> {
        if let Some(ip) = &self.by_ip {
            ip.validate()?;
        }
        if let Some(email) = &self.by_email {
            email.validate()?;
        }
        if self.max_tracked_keys == 0 {
            return Err("max_tracked_keys must be greater than 0");
        }
        if self.cleanup_interval_ms == 0 {
            return Err("cleanup_interval_ms must be greater than 0");
        }
        Ok(())
    }
}
