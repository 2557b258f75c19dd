//! # Input Validation
//!
//! Structural checks for the two things callers can submit: an email address
//! and a survey payload. Validation is pure; it never touches rate-limit
//! state or the store.
//!
//! ```text
//!     " Foo@Example.com "  ──► trim ──► pattern ──► lower-case ──► EmailAddress
//!
//!     { age, findMethod, frustration, payForSchedule,
//!       payForVerification?, feedback?, ...ignored }
//!                          │
//!                          ▼
//!         every field checked, every violation collected
//!                          │
//!                          ▼
//!               SurveyResponses | ValidationError
//! ```

use crate::model::{EmailAddress, SurveyResponses};
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

/// Longest address accepted (RFC 5321 path limit minus the angle brackets).
pub const MAX_EMAIL_LEN: usize = 254;

/// Default bound on free-text survey answers, in characters.
pub const DEFAULT_MAX_TEXT_CHARS: usize = 500;

/// Answers offered for `age`.
pub const AGE_CHOICES: &[&str] = &["Below 18", "18-24", "24-30", "Above 30"];

/// Answers offered for `findMethod`.
pub const FIND_METHOD_CHOICES: &[&str] = &[
    "Broker",
    "Facebook/WhatsApp group",
    "Google/JustDial",
    "Friend/Referral",
    "Haven't lived in one yet",
];

/// Answers offered for the willingness-to-pay questions.
pub const PAY_CHOICES: &[&str] = &["Yes", "Maybe", "No"];

// dot-atom local part, at least two DNS labels in the domain
const EMAIL_PATTERN: &str = r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$";

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern compiles"))
}

/// What was wrong with a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// Absent, null, or blank.
    Missing,
    /// Present but not a JSON string.
    NotAString,
    /// Longer than allowed.
    TooLong {
        /// Allowed maximum.
        max: usize,
        /// Observed length.
        actual: usize,
    },
    /// Not one of the offered answers.
    NotAChoice,
    /// Wrong shape altogether.
    Malformed,
}

/// A single field failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    /// Wire name of the field (`email`, `findMethod`, ...).
    pub field: &'static str,
    /// What was wrong with it.
    pub kind: ViolationKind,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ViolationKind::Missing => write!(f, "{} is missing", self.field),
            ViolationKind::NotAString => write!(f, "{} is not a string", self.field),
            ViolationKind::TooLong { max, actual } => {
                write!(f, "{} is {} characters (max {})", self.field, actual, max)
            }
            ViolationKind::NotAChoice => write!(f, "{} is not an offered answer", self.field),
            ViolationKind::Malformed => write!(f, "{} is malformed", self.field),
        }
    }
}

/// Every field that failed validation. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed: {}", summarize(.violations))]
pub struct ValidationError {
    /// The individual failures, in field order.
    pub violations: Vec<FieldViolation>,
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ValidationError {
    fn single(field: &'static str, kind: ViolationKind) -> Self {
        Self {
            violations: vec![FieldViolation { field, kind }],
        }
    }

    /// Whether `field` is among the failures.
    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

/// Checks an email address and returns its normalised form.
///
/// Leading and trailing whitespace is ignored; anything else outside the
/// pattern (embedded spaces, missing `@`, a domain without a dot) fails.
///
/// # Example
///
/// ```rust
/// use waitlist_gate::validate_email;
///
/// assert_eq!(validate_email(" Priya@Example.in ").unwrap().as_str(), "priya@example.in");
/// assert!(validate_email("priya@localhost").is_err());
/// assert!(validate_email("pri ya@example.in").is_err());
/// ```
pub fn validate_email(candidate: &str) -> Result<EmailAddress, ValidationError> {
    let trimmed = candidate.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::single("email", ViolationKind::Missing));
    }

    let len = trimmed.chars().count();
    if len > MAX_EMAIL_LEN {
        return Err(ValidationError::single(
            "email",
            ViolationKind::TooLong {
                max: MAX_EMAIL_LEN,
                actual: len,
            },
        ));
    }

    if !email_pattern().is_match(trimmed) {
        return Err(ValidationError::single("email", ViolationKind::Malformed));
    }

    Ok(EmailAddress::from_validated(trimmed.to_lowercase()))
}

/// Survey validation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyRules {
    /// Bound on `frustration` and `feedback`, in characters.
    pub max_text_chars: usize,

    /// Require choice questions to carry one of the offered answers.
    pub enforce_choices: bool,
}

impl Default for SurveyRules {
    fn default() -> Self {
        Self {
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
            enforce_choices: true,
        }
    }
}

/// Collects violations while walking a survey object.
struct SurveyCheck<'a> {
    fields: &'a Map<String, Value>,
    rules: &'a SurveyRules,
    violations: Vec<FieldViolation>,
}

impl<'a> SurveyCheck<'a> {
    fn violation(&mut self, field: &'static str, kind: ViolationKind) {
        self.violations.push(FieldViolation { field, kind });
    }

    /// `Ok(None)` means absent or null.
    fn string(&mut self, field: &'static str) -> Option<Option<&'a str>> {
        match self.fields.get(field) {
            None | Some(Value::Null) => Some(None),
            Some(Value::String(s)) => Some(Some(s.as_str())),
            Some(_) => {
                self.violation(field, ViolationKind::NotAString);
                None
            }
        }
    }

    fn required(&mut self, field: &'static str) -> Option<&'a str> {
        match self.string(field)? {
            Some(s) if !s.trim().is_empty() => Some(s),
            _ => {
                self.violation(field, ViolationKind::Missing);
                None
            }
        }
    }

    fn choice(&mut self, field: &'static str, value: &str, choices: &[&str]) -> bool {
        if self.rules.enforce_choices && !choices.contains(&value) {
            self.violation(field, ViolationKind::NotAChoice);
            return false;
        }
        true
    }

    fn bounded(&mut self, field: &'static str, value: &str) -> bool {
        let actual = value.chars().count();
        if actual > self.rules.max_text_chars {
            self.violation(
                field,
                ViolationKind::TooLong {
                    max: self.rules.max_text_chars,
                    actual,
                },
            );
            return false;
        }
        true
    }

    fn required_choice(&mut self, field: &'static str, choices: &[&str]) -> Option<String> {
        let value = self.required(field)?;
        self.choice(field, value, choices).then(|| value.to_owned())
    }
}

/// Checks a survey payload against `rules`.
///
/// All fields are checked before returning, so the error lists every
/// problem at once. Keys the survey does not know about are dropped.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use waitlist_gate::{validate_survey, SurveyRules};
///
/// let payload = json!({
///     "age": "18-24",
///     "findMethod": "Broker",
///     "frustration": "Listings never match the photos",
///     "payForSchedule": "Maybe"
/// });
/// let responses = validate_survey(&payload, &SurveyRules::default()).unwrap();
/// assert_eq!(responses.find_method, "Broker");
/// ```
pub fn validate_survey(
    payload: &Value,
    rules: &SurveyRules,
) -> Result<SurveyResponses, ValidationError> {
    let Some(fields) = payload.as_object() else {
        return Err(ValidationError::single("surveyData", ViolationKind::Malformed));
    };

    let mut check = SurveyCheck {
        fields,
        rules,
        violations: Vec::new(),
    };

    let age = check.required_choice("age", AGE_CHOICES);
    let find_method = check.required_choice("findMethod", FIND_METHOD_CHOICES);
    let frustration = check
        .required("frustration")
        .and_then(|s| check.bounded("frustration", s).then(|| s.to_owned()));
    let pay_for_schedule = check.required_choice("payForSchedule", PAY_CHOICES);

    let pay_for_verification = check.string("payForVerification").flatten().and_then(|s| {
        check
            .choice("payForVerification", s, PAY_CHOICES)
            .then(|| s.to_owned())
    });
    let feedback = check
        .string("feedback")
        .flatten()
        .and_then(|s| check.bounded("feedback", s).then(|| s.to_owned()));

    match (age, find_method, frustration, pay_for_schedule) {
        (Some(age), Some(find_method), Some(frustration), Some(pay_for_schedule))
            if check.violations.is_empty() =>
        {
            if pay_for_verification.is_none() {
                debug!("Survey submitted without payForVerification");
            }
            Ok(SurveyResponses {
                age,
                find_method,
                frustration,
                pay_for_schedule,
                pay_for_verification,
                feedback,
            })
        }
        _ => Err(ValidationError {
            violations: check.violations,
        }),
    }
}
