//! Retry backoff schedule
//!
//! Exponential backoff with deterministic jitter. The jitter sign alternates
//! with attempt parity (added on even attempts, subtracted on odd), so the
//! schedule is fully reproducible while still spreading retries of
//! neighbouring jobs apart.

use std::time::Duration;

/// Minimum delay regardless of base and attempt.
pub const BACKOFF_FLOOR: Duration = Duration::from_millis(100);

const JITTER_FRACTION: f64 = 0.1;

/// Delay before the given retry attempt (1-based).
///
/// `base * 2^(attempts-1)`, with 10% jitter added on even attempts and
/// subtracted on odd ones, floored at [`BACKOFF_FLOOR`].
pub fn backoff_delay(attempts: u32, base_seconds: f64) -> Duration {
    let exponential = base_seconds * 2f64.powi(attempts.saturating_sub(1) as i32);
    let jitter = exponential * JITTER_FRACTION;
    let delay = if attempts % 2 == 0 {
        exponential + jitter
    } else {
        exponential - jitter
    };
    Duration::from_secs_f64(delay.max(BACKOFF_FLOOR.as_secs_f64()))
}
