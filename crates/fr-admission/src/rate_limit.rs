//! Sliding-window rate limiter keyed by client identity
//!
//! Keeps a deque of admission timestamps per identity. On each check the
//! window is pruned, then the request is admitted if the remaining count is
//! below the limit. The guard is advisory: it never errors, and a race can at
//! worst over-admit briefly.
//!
//! Windows are not persisted across restarts; abuse windows are short-lived.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

/// Sweep stale identities once the map grows past this many entries.
const EVICTION_THRESHOLD: usize = 1024;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum admitted requests per identity within the window
    pub max_requests: u32,
    /// Trailing window length
    pub window: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
        }
    }
}

/// Per-identity sliding-window rate limiter.
///
/// Safe for concurrent admission checks across request handlers: each
/// identity's window is mutated under its map shard's exclusive guard, so two
/// concurrent checks for the same identity cannot double-admit past the limit.
pub struct RateLimiter {
    config: RateLimiterConfig,
    windows: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    /// Check whether a request from `identity` may proceed, recording the
    /// admission timestamp if so.
    pub fn allow(&self, identity: &str) -> bool {
        self.allow_at(identity, Instant::now())
    }

    /// Admission check against an explicit clock reading.
    pub fn allow_at(&self, identity: &str, now: Instant) -> bool {
        let cutoff = now.checked_sub(self.config.window);

        let admitted = {
            let mut window = self
                .windows
                .entry(identity.to_string())
                .or_insert_with(VecDeque::new);

            if let Some(cutoff) = cutoff {
                while window.front().is_some_and(|t| *t < cutoff) {
                    window.pop_front();
                }
            }

            if (window.len() as u32) < self.config.max_requests {
                window.push_back(now);
                true
            } else {
                false
            }
        };

        if !admitted {
            debug!(identity = %identity, "Rate limit exceeded");
        }

        // Bound memory: identities without recent activity are swept once the
        // map grows large enough to matter.
        if self.windows.len() > EVICTION_THRESHOLD {
            self.evict_stale(now);
        }

        admitted
    }

    /// Drop identities whose windows hold no timestamp newer than the cutoff.
    fn evict_stale(&self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.config.window) else {
            return;
        };
        let before = self.windows.len();
        self.windows
            .retain(|_, window| window.back().is_some_and(|t| *t >= cutoff));
        let evicted = before.saturating_sub(self.windows.len());
        if evicted > 0 {
            debug!(evicted = evicted, "Evicted stale rate-limit identities");
        }
    }

    /// Number of identities currently tracked (for tests and diagnostics).
    pub fn tracked_identities(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            max_requests,
            window: Duration::from_secs(window_secs),
        })
    }

    #[test]
    fn test_admits_up_to_limit() {
        let rl = limiter(10, 60);
        let now = Instant::now();
        for _ in 0..10 {
            assert!(rl.allow_at("1.2.3.4", now));
        }
        assert!(!rl.allow_at("1.2.3.4", now));
    }

    #[test]
    fn test_eleventh_rejected_then_window_expiry_admits() {
        let rl = limiter(10, 60);
        let start = Instant::now();
        for _ in 0..10 {
            assert!(rl.allow_at("9.9.9.9", start));
        }
        assert!(!rl.allow_at("9.9.9.9", start));

        // Past the window, the pruned deque admits again
        let later = start + Duration::from_secs(61);
        assert!(rl.allow_at("9.9.9.9", later));
    }

    #[test]
    fn test_identities_are_independent() {
        let rl = limiter(1, 60);
        let now = Instant::now();
        assert!(rl.allow_at("a", now));
        assert!(rl.allow_at("b", now));
        assert!(!rl.allow_at("a", now));
    }

    #[test]
    fn test_partial_expiry_frees_exactly_freed_slots() {
        let rl = limiter(3, 10);
        let start = Instant::now();
        assert!(rl.allow_at("ip", start));
        assert!(rl.allow_at("ip", start + Duration::from_secs(5)));
        assert!(rl.allow_at("ip", start + Duration::from_secs(5)));
        assert!(!rl.allow_at("ip", start + Duration::from_secs(6)));

        // First timestamp expired; one slot opens, the later two still count
        let t = start + Duration::from_secs(11);
        assert!(rl.allow_at("ip", t));
        assert!(!rl.allow_at("ip", t));
    }

    #[test]
    fn test_stale_identity_eviction() {
        let rl = limiter(5, 1);
        let start = Instant::now();
        for i in 0..EVICTION_THRESHOLD + 10 {
            rl.allow_at(&format!("ip-{i}"), start);
        }
        // All windows are stale at this point; the next check triggers a sweep
        let later = start + Duration::from_secs(2);
        rl.allow_at("fresh", later);
        assert!(rl.tracked_identities() <= 2);
    }
}
