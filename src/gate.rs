//! # Submission Gate
//!
//! The one entry point for waitlist submissions. Every attempt runs the same
//! pipeline:
//!
//! ```text
//!     submit_email(email, source)        submit_survey(email, survey, source)
//!              │                                    │
//!              └───────────────┬────────────────────┘
//!                              ▼
//!                 ┌─────────────────────────┐
//!                 │ DualAxisLimiter::check  │  ip axis, then email axis
//!                 └────────────┬────────────┘
//!                              ▼
//!                 ┌─────────────────────────┐
//!                 │ validate input          │  InvalidInput wins over a denial
//!                 └────────────┬────────────┘
//!                              ▼
//!                 ┌─────────────────────────┐
//!                 │ denied? → RateLimited   │  store never touched
//!                 └────────────┬────────────┘
//!                              ▼
//!                 ┌─────────────────────────┐
//!                 │ SubmissionStore         │  Conflict | Internal | Ok
//!                 └─────────────────────────┘
//! ```
//!
//! An admitted attempt keeps its quota slot whatever the outcome, so a
//! caller cycling through malformed or duplicate addresses still runs out.

use crate::error::{GateError, InvalidKind};
use crate::model::{EmailAddress, SubmissionRecord};
use crate::rate_limiter::{Admission, DualAxisLimiter, LimiterMetrics, RateLimited};
use crate::store::{StoreError, SubmissionStore};
use crate::validate::{validate_email, validate_survey, SurveyRules};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Rate-limited, validated front door to a [`SubmissionStore`].
///
/// Cheap to clone; clones share limiter state and the store.
#[derive(Clone)]
pub struct SubmissionGate {
    limiter: DualAxisLimiter,
    rules: SurveyRules,
    store: Arc<dyn SubmissionStore>,
}

impl SubmissionGate {
    /// Assembles a gate. See [`GateBuilder`](crate::GateBuilder) for defaults.
    pub fn new(limiter: DualAxisLimiter, rules: SurveyRules, store: Arc<dyn SubmissionStore>) -> Self {
        Self {
            limiter,
            rules,
            store,
        }
    }

    /// Adds `email` to the waitlist.
    ///
    /// # Errors
    ///
    /// - [`GateError::InvalidInput`] for a malformed address, whatever the
    ///   rate-limit state
    /// - [`GateError::RateLimited`] when either axis refuses the attempt
    /// - [`GateError::Conflict`] when the address is already listed
    /// - [`GateError::Internal`] when the store fails
    #[instrument(name = "submit_email", skip(self, email, source), fields(source = %source))]
    pub async fn submit_email(
        &self,
        email: &str,
        source: &str,
    ) -> Result<SubmissionRecord, GateError> {
        let admission = self.limiter.check(source, email);

        let email = validate_email(email).map_err(|e| {
            debug!(error = %e, "Rejected email submission");
            GateError::InvalidInput(InvalidKind::Email)
        })?;
        admitted(admission)?;

        match self.store.insert_email(&email).await {
            Ok(record) => {
                info!("Email added to waitlist");
                Ok(record)
            }
            Err(e) => Err(store_failure(e, &email)),
        }
    }

    /// Records survey answers for `email`, overwriting earlier ones.
    ///
    /// Returns the updated records; empty if the address was never listed.
    ///
    /// # Errors
    ///
    /// As [`submit_email`](Self::submit_email), except that a missing record
    /// is not an error and [`GateError::Conflict`] cannot occur.
    #[instrument(name = "submit_survey", skip(self, email, survey, source), fields(source = %source))]
    pub async fn submit_survey(
        &self,
        email: &str,
        survey: &Value,
        source: &str,
    ) -> Result<Vec<SubmissionRecord>, GateError> {
        let admission = self.limiter.check(source, email);

        let email = validate_email(email).map_err(|e| {
            debug!(error = %e, "Rejected survey email");
            GateError::InvalidInput(InvalidKind::Email)
        })?;
        let responses = validate_survey(survey, &self.rules).map_err(|e| {
            debug!(error = %e, "Rejected survey answers");
            GateError::InvalidInput(InvalidKind::Survey)
        })?;
        admitted(admission)?;

        match self.store.complete_survey(&email, &responses).await {
            Ok(rows) => {
                if rows.is_empty() {
                    info!("Survey submitted for an address not on the waitlist");
                } else {
                    info!("Survey recorded");
                }
                Ok(rows)
            }
            Err(e) => Err(store_failure(e, &email)),
        }
    }

    /// Every record, newest first.
    ///
    /// # Errors
    ///
    /// [`GateError::Internal`] when the store fails.
    pub async fn list_submissions(&self) -> Result<Vec<SubmissionRecord>, GateError> {
        self.store.list_recent().await.map_err(|e| {
            error!(error = %e, "Failed to list submissions");
            GateError::Internal
        })
    }

    /// Limiter tallies and health.
    pub fn stats(&self) -> LimiterMetrics {
        self.limiter.metrics()
    }

    /// The underlying limiter, e.g. to start its cleanup thread.
    pub fn limiter(&self) -> &DualAxisLimiter {
        &self.limiter
    }

    /// Survey validation settings in force.
    pub fn rules(&self) -> &SurveyRules {
        &self.rules
    }
}

impl fmt::Debug for SubmissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionGate")
            .field("limiter", &self.limiter)
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

fn admitted(admission: Result<Admission, RateLimited>) -> Result<Admission, GateError> {
    admission.map_err(|limited| {
        info!(
            axis = %limited.axis,
            retry_after_ms = limited.retry_after_ms,
            "Submission rate limited"
        );
        GateError::from(limited)
    })
}

fn store_failure(err: StoreError, email: &EmailAddress) -> GateError {
    match err {
        StoreError::Conflict => {
            debug!("Email already on the waitlist");
            GateError::Conflict
        }
        other => {
            error!(error = %other, email = %email, "Store request failed");
            GateError::Internal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SurveyResponses;
    use crate::rate_limiter::{Axis, ManualClock, RateLimitPolicy, WindowConfig};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct FailingStore;

    #[async_trait]
    impl SubmissionStore for FailingStore {
        async fn insert_email(&self, _: &EmailAddress) -> Result<SubmissionRecord, StoreError> {
            Err(StoreError::Timeout)
        }

        async fn complete_survey(
            &self,
            _: &EmailAddress,
            _: &SurveyResponses,
        ) -> Result<Vec<SubmissionRecord>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn list_recent(&self) -> Result<Vec<SubmissionRecord>, StoreError> {
            Err(StoreError::Rejected {
                status: 503,
                message: "maintenance".into(),
            })
        }
    }

    fn gate_with(policy: RateLimitPolicy, store: Arc<dyn SubmissionStore>) -> SubmissionGate {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = DualAxisLimiter::new(&policy, clock).unwrap();
        SubmissionGate::new(limiter, SurveyRules::default(), store)
    }

    fn survey() -> Value {
        json!({
            "age": "Below 18",
            "findMethod": "Haven't lived in one yet",
            "frustration": "No idea where to start",
            "payForSchedule": "No"
        })
    }

    #[tokio::test]
    async fn test_email_lifecycle() {
        let store = Arc::new(MemoryStore::new());
        let gate = gate_with(RateLimitPolicy::unlimited(), store.clone());

        let record = gate.submit_email(" New@Example.com ", "1.1.1.1").await.unwrap();
        assert_eq!(record.email, "new@example.com");

        assert_eq!(
            gate.submit_email("new@example.com", "1.1.1.1").await,
            Err(GateError::Conflict)
        );

        let rows = gate.submit_survey("NEW@example.com", &survey(), "1.1.1.1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(store.get("new@example.com").unwrap().survey_completed);
    }

    #[tokio::test]
    async fn test_invalid_survey_kinds() {
        let gate = gate_with(RateLimitPolicy::unlimited(), Arc::new(MemoryStore::new()));

        assert_eq!(
            gate.submit_survey("not-an-email", &survey(), "1.1.1.1").await,
            Err(GateError::InvalidInput(InvalidKind::Email))
        );
        assert_eq!(
            gate.submit_survey("a@b.com", &json!({ "age": "18-24" }), "1.1.1.1").await,
            Err(GateError::InvalidInput(InvalidKind::Survey))
        );
    }

    #[tokio::test]
    async fn test_rate_limit_applies_to_both_operations() {
        let policy = RateLimitPolicy::unlimited().with_ip(Some(WindowConfig::per_day(2)));
        let gate = gate_with(policy, Arc::new(MemoryStore::new()));

        gate.submit_email("a@b.com", "9.9.9.9").await.unwrap();
        gate.submit_survey("a@b.com", &survey(), "9.9.9.9").await.unwrap();

        let err = gate.submit_email("c@d.com", "9.9.9.9").await.unwrap_err();
        assert!(matches!(err, GateError::RateLimited { axis: Axis::Ip, .. }));

        // A different source is unaffected
        gate.submit_email("c@d.com", "8.8.8.8").await.unwrap();
        assert_eq!(gate.stats().total_denied(), 1);
    }

    #[tokio::test]
    async fn test_store_failures_are_internal() {
        let gate = gate_with(RateLimitPolicy::unlimited(), Arc::new(FailingStore));

        assert_eq!(gate.submit_email("a@b.com", "1").await, Err(GateError::Internal));
        assert_eq!(
            gate.submit_survey("a@b.com", &survey(), "1").await,
            Err(GateError::Internal)
        );
        assert_eq!(gate.list_submissions().await, Err(GateError::Internal));
    }

    #[test]
    fn test_debug_omits_store() {
        let gate = gate_with(RateLimitPolicy::default(), Arc::new(MemoryStore::new()));
        let rendered = format!("{gate:?}");
        assert!(rendered.starts_with("SubmissionGate"));
        assert_eq!(gate.rules(), &SurveyRules::default());
    }
}
