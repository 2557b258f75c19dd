//! Errors surfaced by the submission gate.
//!
//! Every failure collapses into one of four categories. Each carries a fixed,
//! user-safe message; internal detail is logged, never returned.

use crate::rate_limiter::{Axis, RateLimited};
use std::fmt;
use thiserror::Error;

/// Which input failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidKind {
    /// The email address.
    Email,
    /// The survey payload, or the request around it.
    Survey,
}

impl fmt::Display for InvalidKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidKind::Email => f.write_str("email"),
            InvalidKind::Survey => f.write_str("survey"),
        }
    }
}

/// Outcome categories of a refused submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// Malformed email or survey.
    #[error("invalid {0}")]
    InvalidInput(InvalidKind),

    /// Too many recent attempts from the same source or for the same email.
    #[error("rate limited on {axis} axis, retry in {retry_after_ms}ms")]
    RateLimited {
        /// Axis that refused the attempt.
        axis: Axis,
        /// Milliseconds until the window rolls over.
        retry_after_ms: u64,
    },

    /// The email is already on the waitlist.
    #[error("email already registered")]
    Conflict,

    /// The store failed. Detail has been logged.
    #[error("internal error")]
    Internal,
}

impl GateError {
    /// Message safe to show to the person submitting.
    pub fn public_message(&self) -> &'static str {
        match self {
            GateError::InvalidInput(InvalidKind::Email) => "Invalid email format",
            GateError::InvalidInput(InvalidKind::Survey) => "Invalid survey data",
            GateError::RateLimited { .. } => "Too many attempts. Please try again later.",
            GateError::Conflict => "Email already exists",
            GateError::Internal => "An error occurred",
        }
    }

    /// Whether resubmitting later could succeed without changing the input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GateError::RateLimited { .. } | GateError::Internal)
    }
}

impl From<RateLimited> for GateError {
    fn from(limited: RateLimited) -> Self {
        GateError::RateLimited {
            axis: limited.axis,
            retry_after_ms: limited.retry_after_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_messages() {
        assert_eq!(
            GateError::InvalidInput(InvalidKind::Email).public_message(),
            "Invalid email format"
        );
        assert_eq!(
            GateError::InvalidInput(InvalidKind::Survey).public_message(),
            "Invalid survey data"
        );
        assert_eq!(
            GateError::RateLimited {
                axis: Axis::Ip,
                retry_after_ms: 1
            }
            .public_message(),
            "Too many attempts. Please try again later."
        );
        assert_eq!(GateError::Conflict.public_message(), "Email already exists");
        assert_eq!(GateError::Internal.public_message(), "An error occurred");
    }

    #[test]
    fn test_from_rate_limited() {
        let err: GateError = RateLimited {
            axis: Axis::Email,
            retry_after_ms: 1500,
        }
        .into();
        assert_eq!(err.to_string(), "rate limited on email axis, retry in 1500ms");
        assert!(err.is_retryable());
        assert!(!GateError::Conflict.is_retryable());
    }
}
