//! Submission payload validation
//!
//! Structural checks only. The email check is a cheap heuristic (exactly one
//! `@`, a `.` somewhere after it, no whitespace), deliberately not
//! RFC-5322-complete; the validator of record is whoever delivers the mail.

use fr_common::Submission;
use thiserror::Error;

/// Per-field length ceilings, applied after trimming.
#[derive(Debug, Clone)]
pub struct FieldLimits {
    pub max_name_len: usize,
    pub max_email_len: usize,
    pub max_message_len: usize,
}

impl Default for FieldLimits {
    fn default() -> Self {
        Self {
            max_name_len: 200,
            max_email_len: 320,
            max_message_len: 4000,
        }
    }
}

/// Admission validation failures, reported synchronously to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Request body too large: {size} bytes (limit {limit})")]
    BodyTooLarge { size: usize, limit: usize },

    #[error("All fields are required")]
    MissingFields,

    #[error("Field '{field}' exceeds maximum length of {max} characters")]
    FieldTooLong { field: &'static str, max: usize },

    #[error("Invalid email address")]
    InvalidEmail,
}

/// Reject request bodies above the configured byte ceiling.
pub fn check_body_size(size: usize, limit: usize) -> Result<(), ValidationError> {
    if size > limit {
        return Err(ValidationError::BodyTooLarge { size, limit });
    }
    Ok(())
}

/// Validate raw submission fields, producing a trimmed [`Submission`].
pub fn validate_submission(
    name: &str,
    email: &str,
    message: &str,
    limits: &FieldLimits,
) -> Result<Submission, ValidationError> {
    let name = name.trim();
    let email = email.trim();
    let message = message.trim();

    if name.is_empty() || email.is_empty() || message.is_empty() {
        return Err(ValidationError::MissingFields);
    }

    if name.chars().count() > limits.max_name_len {
        return Err(ValidationError::FieldTooLong {
            field: "name",
            max: limits.max_name_len,
        });
    }
    if email.chars().count() > limits.max_email_len {
        return Err(ValidationError::FieldTooLong {
            field: "email",
            max: limits.max_email_len,
        });
    }
    if message.chars().count() > limits.max_message_len {
        return Err(ValidationError::FieldTooLong {
            field: "message",
            max: limits.max_message_len,
        });
    }

    if !is_plausible_email(email) {
        return Err(ValidationError::InvalidEmail);
    }

    Ok(Submission {
        name: name.to_string(),
        email: email.to_string(),
        message: message.to_string(),
    })
}

/// Structural email check: exactly one `@`, a `.` after it, no whitespace.
fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty() && domain.contains('.')
}
