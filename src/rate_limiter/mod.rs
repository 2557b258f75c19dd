//! # Rate Limiter Module
//!
//! Fixed-window attempt counting on two independent axes.
//!
//! ## Module Structure
//!
//! ```text
//!     rate_limiter/
//!     ├── mod.rs          (You are here - Module organization)
//!     ├── config.rs       (Windows, axes, policy)
//!     ├── core.rs         (Fixed window counter for one key)
//!     ├── manager.rs      (Concurrent key → counter map for one axis)
//!     ├── dual.rs         (IP-then-email admission)
//!     ├── metrics.rs      (Tallies and health)
//!     └── utils.rs        (Clocks)
//! ```
//!
//! ## Architecture Flow
//!
//! ```text
//!     Submission attempt
//!          │
//!          ▼
//!     ┌─────────┐
//!     │  Dual   │ ◄── ip axis, then email axis
//!     └────┬────┘
//!          │
//!          ▼
//!     ┌─────────┐
//!     │ Manager │ ◄── per-key critical section, eviction
//!     └────┬────┘
//!          │
//!          ▼
//!     ┌─────────┐
//!     │  Core   │ ◄── {count, windowStart} decision
//!     └────┬────┘
//!          │
//!          ▼
//!     ┌─────────┐
//!     │  Utils  │ ◄── now_ms()
//!     └─────────┘
//! ```

mod config;
mod core;
mod dual;
mod manager;
mod metrics;
mod utils;

/// Window and policy configuration
pub use config::{
    Axis, RateLimitPolicy, WindowConfig, DAY_MS, DEFAULT_CLEANUP_INTERVAL_MS,
    DEFAULT_MAX_TRACKED_KEYS, HOUR_MS,
};

/// Single-key fixed window counter
pub use self::core::{Decision, FixedWindowCounter};

/// Two-axis admission
pub use dual::{email_key, Admission, DualAxisLimiter, RateLimited};

/// Per-axis concurrent limiter
pub use manager::{KeyedLimiter, ManagerStats};

/// Metrics and health
pub use metrics::{AxisMetrics, HealthStatus, LimiterMetrics};

/// Time sources
pub use utils::{current_time_ms, Clock, ManualClock, SystemClock};
