//! Admission control for inbound submissions
//!
//! Everything that runs before a request reaches business logic:
//! - Payload validation (size ceiling, field ceilings, email format)
//! - Per-identity sliding-window rate limiting
//!
//! Validation is sequenced before the rate-limit check so malformed requests
//! never consume an admission slot.

pub mod rate_limit;
pub mod validate;

pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use validate::{check_body_size, validate_submission, FieldLimits, ValidationError};
