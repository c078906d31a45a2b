//! # Backoff policy for hardware reconnection.
//!
//! [`BackoffPolicy`] controls how reconnection delays grow after repeated failures.
//! It is parameterized by:
//! - [`BackoffPolicy::first`] the base delay;
//! - [`BackoffPolicy::max`] the maximum delay cap;
//! - [`BackoffPolicy::growth`] linear (`first × (n + 1)`) or exponential (`first × factor^n`).
//!
//! The attempt number `n` is the subsystem's current restart count as held by the
//! health registry, not a counter kept by the caller, so the delay and the retry
//! gate always agree.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use devicevisor::{BackoffPolicy, Growth, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_secs(5),
//!     max: Duration::from_secs(30),
//!     growth: Growth::Linear,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_secs(5));
//! assert_eq!(backoff.next(2), Duration::from_secs(15));
//! // 5s × 7 = 35s → capped at max=30s
//! assert_eq!(backoff.next(6), Duration::from_secs(30));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// How the base delay grows with the attempt number.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Growth {
    /// `first × (attempt + 1)`.
    Linear,
    /// `first × factor^attempt`.
    Exponential {
        /// Multiplicative growth factor (`>= 1.0` recommended).
        factor: f64,
    },
}

/// Reconnection backoff policy.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Base delay.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Growth curve.
    pub growth: Growth,
    /// Jitter policy to prevent supervisors retrying in lockstep.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a strategy with:
    /// - `first = 5s`;
    /// - `max = 30s`;
    /// - linear growth, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(5),
            max: Duration::from_secs(30),
            growth: Growth::Linear,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Computes the delay for the given attempt number (0-indexed).
    ///
    /// The base delay is clamped to [`BackoffPolicy::max`] before jitter is applied,
    /// so jitter can only shorten it.
    pub fn next(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let first_secs = self.first.as_secs_f64();
        let unclamped_secs = match self.growth {
            Growth::Linear => first_secs * (f64::from(attempt) + 1.0),
            Growth::Exponential { factor } => {
                let clamped_exp = attempt.min(i32::MAX as u32) as i32;
                first_secs * factor.powi(clamped_exp)
            }
        };

        let base =
            if !unclamped_secs.is_finite() || unclamped_secs < 0.0 || unclamped_secs > max_secs {
                self.max
            } else {
                Duration::from_secs_f64(unclamped_secs)
            };

        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn linear(first_ms: u64, max_ms: u64) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(first_ms),
            max: Duration::from_millis(max_ms),
            growth: Growth::Linear,
            jitter: JitterPolicy::None,
        }
    }

    #[test]
    fn test_attempt_zero_returns_first() {
        assert_eq!(linear(5000, 30_000).next(0), Duration::from_secs(5));
    }

    #[test]
    fn test_linear_growth_no_jitter() {
        let policy = linear(5000, 30_000);
        assert_eq!(policy.next(1), Duration::from_secs(10));
        assert_eq!(policy.next(2), Duration::from_secs(15));
        assert_eq!(policy.next(3), Duration::from_secs(20));
        assert_eq!(policy.next(5), Duration::from_secs(30));
    }

    #[test]
    fn test_linear_capped() {
        let policy = linear(5000, 30_000);
        for attempt in 5..50 {
            assert_eq!(policy.next(attempt), Duration::from_secs(30));
        }
    }

    #[test]
    fn test_exponential_growth_no_jitter() {
        let policy = BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            growth: Growth::Exponential { factor: 2.0 },
            jitter: JitterPolicy::None,
        };

        assert_eq!(policy.next(0), Duration::from_millis(100));
        assert_eq!(policy.next(1), Duration::from_millis(200));
        assert_eq!(policy.next(2), Duration::from_millis(400));
        assert_eq!(policy.next(4), Duration::from_millis(1600));
    }

    #[test]
    fn test_first_exceeds_max() {
        assert_eq!(linear(10_000, 5000).next(0), Duration::from_secs(5));
    }

    #[test]
    fn test_non_finite_overflow_clamps_to_max() {
        let policy = BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(10),
            growth: Growth::Exponential { factor: 2.0 },
            jitter: JitterPolicy::None,
        };
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(10));
        assert_eq!(linear(100, 10_000).next(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_equal_jitter_bounds() {
        let policy = BackoffPolicy {
            jitter: JitterPolicy::Equal,
            ..linear(1000, 30_000)
        };
        for _ in 0..50 {
            let delay = policy.next(0);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_full_jitter_never_exceeds_cap() {
        let policy = BackoffPolicy {
            jitter: JitterPolicy::Full,
            ..linear(5000, 30_000)
        };
        for attempt in 0..20 {
            assert!(policy.next(attempt) <= Duration::from_secs(30));
        }
    }
}
