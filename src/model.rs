//! Records and payloads shared by the gate, the stores and the transport.
//!
//! Field names follow the hosted `emails` table (`snake_case`) for records,
//! and the landing page's survey form (`camelCase`) for survey answers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An email address that passed [`validate_email`](crate::validate_email).
///
/// Always trimmed and lower-cased; this is the identity key of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub(crate) fn from_validated(address: String) -> Self {
        Self(address)
    }

    /// The address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unwraps into the owned string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validated answers to the follow-up survey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyResponses {
    /// Age bracket.
    pub age: String,

    /// How the respondent found their last PG.
    pub find_method: String,

    /// Free-text answer about the most frustrating part of the search.
    pub frustration: String,

    /// Willingness to pay for scheduling a visit.
    pub pay_for_schedule: String,

    /// Willingness to pay for verified listings. Only some form variants ask.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pay_for_verification: Option<String>,

    /// Optional free-text feedback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// One row of the waitlist: one per unique email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    /// Unique key.
    pub email: String,

    /// Set on first insert, never changed.
    pub created_at: DateTime<Utc>,

    /// Flips to `true` once a survey is recorded.
    #[serde(default)]
    pub survey_completed: bool,

    /// Latest survey answers. Absent until the survey is completed.
    #[serde(default)]
    pub survey_responses: Option<SurveyResponses>,
}

impl SubmissionRecord {
    /// A fresh record as created by a first email submission.
    pub fn new(email: &EmailAddress, created_at: DateTime<Utc>) -> Self {
        Self {
            email: email.as_str().to_owned(),
            created_at,
            survey_completed: false,
            survey_responses: None,
        }
    }

    /// Records (or overwrites) survey answers.
    pub fn complete_survey(&mut self, responses: SurveyResponses) {
        self.survey_completed = true;
        self.survey_responses = Some(responses);
    }
}
