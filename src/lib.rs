//! # Waitlist Gate - Abuse-Resistant Waitlist Intake
//!
//! The backend of a pre-launch landing page: it accepts email sign-ups and
//! a follow-up survey, and makes sure a single caller cannot flood the list.
//!
//! ## What Gets Through
//!
//! Every submission passes the same gate before it reaches storage:
//!
//! ```text
//!     Browser                         waitlist-gate                     Store
//!        │                                  │                              │
//!        │  POST /api/email {email}         │                              │
//!        ├─────────────────────────────────►│                              │
//!        │                                  │ ip axis      3 / 24h         │
//!        │                                  │ email axis   5 / 1h          │
//!        │                                  │ validate email               │
//!        │                                  │ insert ─────────────────────►│
//!        │                                  │◄───────────── record/conflict│
//!        │◄─────────────────────────────────┤                              │
//!        │   200 | 400 | 409 | 429 | 500    │                              │
//! ```
//!
//! - **Two independent axes** - the calling address and the normalised
//!   email each get their own fixed-window budget
//! - **Denials are free** - an attempt refused on either axis consumes
//!   nothing
//! - **Admitted attempts count** - malformed or duplicate submissions still
//!   use up the caller's budget
//! - **Bounded memory** - expired windows are swept; when the key table is
//!   full of live windows new keys are refused, never waved through
//!
//! ## Quick Start
//!
//! ```rust
//! use waitlist_gate::{GateBuilder, GateError, WindowConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let gate = GateBuilder::new()
//!     .ip_limit(Some(WindowConfig::per_day(3)))
//!     .email_limit(Some(WindowConfig::per_hour(5)))
//!     .build()
//!     .unwrap();
//!
//! let record = gate.submit_email("Priya@Example.in", "203.0.113.7").await.unwrap();
//! assert_eq!(record.email, "priya@example.in");
//!
//! let again = gate.submit_email("priya@example.in", "203.0.113.7").await;
//! assert_eq!(again, Err(GateError::Conflict));
//! # }
//! ```
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │   server (axum)         │
//!                    └──────────┬──────────────┘
//!                               │
//!                    ┌──────────▼──────────────┐
//!                    │    SubmissionGate       │
//!                    ├─────────────────────────┤
//!                    │  • submit_email()       │
//!                    │  • submit_survey()      │
//!                    │  • stats()              │
//!                    └──────────┬──────────────┘
//!                               │
//!            ┌──────────────────┼───────────────────┐
//!            │                  │                   │
//!     ┌──────▼───────┐   ┌──────▼───────┐   ┌───────▼────────┐
//!     │ rate_limiter │   │  validate    │   │  store         │
//!     ├──────────────┤   ├──────────────┤   ├────────────────┤
//!     │ fixed window │   │ email regex  │   │ MemoryStore    │
//!     │ per ip/email │   │ survey rules │   │ RestStore      │
//!     └──────────────┘   └──────────────┘   └────────────────┘
//! ```
//!
//! ## Performance Characteristics
//!
//! | Operation | Time Complexity |
//! |-----------|-----------------|
//! | rate-limit check | O(1) per axis |
//! | cleanup sweep | O(tracked keys) |
//! | email validation | O(address length) |
//!
//! ## Thread Safety
//!
//! [`SubmissionGate`] is `Clone + Send + Sync`; clones share limiter state
//! and the store. Each key's counter is updated inside a single map-entry
//! critical section, so concurrent attempts for one key never over-admit.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    missing_debug_implementations
)]
#![forbid(unsafe_code)]

pub mod config;
pub mod server;
pub mod store;

mod error;
mod gate;
mod model;
mod rate_limiter;
mod validate;

use std::sync::Arc;

// Public re-exports
pub use error::{GateError, InvalidKind};
pub use gate::SubmissionGate;
pub use model::{EmailAddress, SubmissionRecord, SurveyResponses};
pub use rate_limiter::{
    current_time_ms, email_key, Admission, Axis, AxisMetrics, Clock, Decision, DualAxisLimiter,
    FixedWindowCounter, HealthStatus, KeyedLimiter, LimiterMetrics, ManagerStats, ManualClock,
    RateLimitPolicy, RateLimited, SystemClock, WindowConfig, DAY_MS, DEFAULT_CLEANUP_INTERVAL_MS,
    DEFAULT_MAX_TRACKED_KEYS, HOUR_MS,
};
pub use validate::{
    validate_email, validate_survey, FieldViolation, SurveyRules, ValidationError, ViolationKind,
    AGE_CHOICES, DEFAULT_MAX_TEXT_CHARS, FIND_METHOD_CHOICES, MAX_EMAIL_LEN, PAY_CHOICES,
};

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum supported Rust version.
pub const MSRV: &str = "1.75.0";

/// Prelude module for convenient imports.
///
/// ```rust
/// use waitlist_gate::prelude::*;
/// ```
pub mod prelude {
    //! Common imports for wiring a gate into a service.

    pub use crate::store::{MemoryStore, SubmissionStore};
    pub use crate::{
        GateBuilder, GateError, HealthStatus, RateLimitPolicy, SubmissionGate, SubmissionRecord,
        SurveyRules, WindowConfig,
    };
}

/// Fluent construction of a [`SubmissionGate`].
///
/// Defaults: 3 attempts per day per source, 5 per hour per email, survey
/// rules from [`SurveyRules::default`], an in-memory store and the system
/// clock.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use waitlist_gate::{GateBuilder, ManualClock, WindowConfig};
/// use waitlist_gate::store::MemoryStore;
///
/// let gate = GateBuilder::new()
///     .ip_limit(None)                                  // trust the edge proxy
///     .email_limit(Some(WindowConfig::per_hour(2)))
///     .store(Arc::new(MemoryStore::new()))
///     .clock(Arc::new(ManualClock::new(0)))
///     .build()
///     .unwrap();
///
/// // Invalid settings are reported, not panicked on
/// let result = GateBuilder::new()
///     .email_limit(Some(WindowConfig::new(0, 1000)))
///     .build();
/// assert!(result.is_err());
/// # let _ = gate;
/// ```
#[derive(Default)]
pub struct GateBuilder {
    policy: RateLimitPolicy,
    rules: SurveyRules,
    store: Option<Arc<dyn store::SubmissionStore>>,
    clock: Option<Arc<dyn Clock>>,
}

impl GateBuilder {
    /// Creates a builder with the defaults above.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole rate-limit policy.
    pub fn policy(mut self, policy: RateLimitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Per-source window. `None` disables the axis.
    pub fn ip_limit(mut self, window: Option<WindowConfig>) -> Self {
        self.policy.by_ip = window;
        self
    }

    /// Per-email window. `None` disables the axis.
    pub fn email_limit(mut self, window: Option<WindowConfig>) -> Self {
        self.policy.by_email = window;
        self
    }

    /// Cap on keys tracked per axis.
    pub fn max_tracked_keys(mut self, max: usize) -> Self {
        self.policy.max_tracked_keys = max;
        self
    }

    /// Survey validation settings.
    pub fn survey_rules(mut self, rules: SurveyRules) -> Self {
        self.rules = rules;
        self
    }

    /// Persistence backend.
    pub fn store(mut self, store: Arc<dyn store::SubmissionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Time source for the limiter windows.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the gate.
    ///
    /// # Errors
    ///
    /// Returns an error message if the rate-limit policy is invalid.
    pub fn build(self) -> Result<SubmissionGate, &'static str> {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let limiter = DualAxisLimiter::new(&self.policy, clock)?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(store::MemoryStore::new()));

        Ok(SubmissionGate::new(limiter, self.rules, store))
    }
}

impl std::fmt::Debug for GateBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateBuilder")
            .field("policy", &self.policy)
            .field("rules", &self.rules)
            .field("store", &self.store.as_ref().map(|_| "custom"))
            .field("clock", &self.clock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builder_defaults() {
        let gate = GateBuilder::new().build().unwrap();
        let stats = gate.stats();

        assert_eq!(stats.ip.as_ref().unwrap().axis, Axis::Ip);
        assert_eq!(stats.email.as_ref().unwrap().axis, Axis::Email);
        assert_eq!(gate.rules(), &SurveyRules::default());

        gate.submit_email("a@b.com", "1.2.3.4").await.unwrap();
        assert_eq!(gate.list_submissions().await.unwrap().len(), 1);
    }

    #[test]
    fn test_builder_validation() {
        let result = GateBuilder::new()
            .ip_limit(Some(WindowConfig::new(3, 0)))
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_builder_chain() {
        let clock = Arc::new(ManualClock::new(0));
        let gate = GateBuilder::new()
            .ip_limit(None)
            .email_limit(Some(WindowConfig::new(1, 1000)))
            .max_tracked_keys(10)
            .survey_rules(SurveyRules {
                max_text_chars: 10,
                enforce_choices: false,
            })
            .clock(clock.clone())
            .build()
            .unwrap();

        assert!(gate.stats().ip.is_none());
        assert_eq!(gate.stats().email.unwrap().max_tracked_keys, 10);

        gate.submit_email("a@b.com", "1").await.unwrap();
        assert!(matches!(
            gate.submit_email("a@b.com", "2").await,
            Err(GateError::RateLimited {
                axis: Axis::Email,
                ..
            })
        ));

        clock.advance_ms(1001);
        assert_eq!(gate.submit_email("a@b.com", "3").await, Err(GateError::Conflict));
    }

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let _builder = GateBuilder::new();
        let _store = MemoryStore::new();
        let _policy = RateLimitPolicy::default();
        let _status = HealthStatus::Healthy;
    }

    #[test]
    fn test_constants() {
        assert!(!VERSION.is_empty());
        assert_eq!(MSRV, "1.75.0");
    }
}
