//! # Submission Store
//!
//! Persistence for waitlist records behind one async trait, so the gate
//! never knows whether it talks to memory or to a hosted table.
//!
//! ```text
//!     SubmissionGate
//!          │  Arc<dyn SubmissionStore>
//!          ├──────────────► MemoryStore   (DashMap, process lifetime)
//!          └──────────────► RestStore     (PostgREST `emails` table)
//! ```
//!
//! Implementations must treat the email as the unique key and report a
//! duplicate insert as [`StoreError::Conflict`], never as a generic failure.

mod memory;
mod rest;

pub use memory::MemoryStore;
pub use rest::{RestConfig, RestStore, DEFAULT_STORE_TIMEOUT_MS, DEFAULT_TABLE};

use crate::model::{EmailAddress, SubmissionRecord, SurveyResponses};
use async_trait::async_trait;
use thiserror::Error;

/// Failures reported by a [`SubmissionStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A record with this email already exists.
    #[error("email already exists")]
    Conflict,

    /// The store did not answer in time. Nothing is retried.
    #[error("store request timed out")]
    Timeout,

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with an error.
    #[error("store rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status returned.
        status: u16,
        /// Message from the store, if any.
        message: String,
    },

    /// The store answered with something that is not a record.
    #[error("unexpected store response: {0}")]
    Decode(String),
}

/// Durable keyed store of [`SubmissionRecord`]s.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Creates a record for `email`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] if the email already exists.
    async fn insert_email(&self, email: &EmailAddress) -> Result<SubmissionRecord, StoreError>;

    /// Marks the record for `email` as surveyed, overwriting earlier answers.
    ///
    /// Returns the updated records. Empty when no record exists; that is not
    /// an error.
    async fn complete_survey(
        &self,
        email: &EmailAddress,
        responses: &SurveyResponses,
    ) -> Result<Vec<SubmissionRecord>, StoreError>;

    /// All records, newest first.
    async fn list_recent(&self) -> Result<Vec<SubmissionRecord>, StoreError>;
}
