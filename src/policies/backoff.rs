//! # Restart-delay policy.
//!
//! [`BackoffPolicy`] controls how long the restart-policy loop waits before
//! re-entering `start`. It is parameterized by:
//! - [`BackoffPolicy::first`] the initial delay;
//! - [`BackoffPolicy::factor`] the multiplicative growth factor;
//! - [`BackoffPolicy::max`] the maximum delay cap.
//!
//! The delay for restart `n` is `first × factor^n`, clamped to `max`, with
//! jitter applied last. The default factor is `1.0`, i.e. a plain fixed
//! restart delay; exponential growth is opt-in. Because the base delay is
//! derived purely from the restart counter, jitter output never feeds back
//! into subsequent calculations.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use pup::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(10),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! // Restart 0 — uses 'first' (100ms)
//! assert_eq!(backoff.next(0), Duration::from_millis(100));
//!
//! // Restart 1 — first × factor^1 = 200ms
//! assert_eq!(backoff.next(1), Duration::from_millis(200));
//!
//! // Restart 10 — 100ms × 2^10 = 102_400ms → capped at max=10s
//! assert_eq!(backoff.next(10), Duration::from_secs(10));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Restart delay policy.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Initial delay before the first restart.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Jitter policy to prevent synchronized restarts.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a policy with:
    /// - `first = 100ms`;
    /// - `factor = 1.0` (constant delay);
    /// - `max = 30s`.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            jitter: JitterPolicy::None,
            factor: 1.0,
        }
    }
}

impl BackoffPolicy {
    /// Convenience constructor for a fixed delay (factor `1.0`, no jitter).
    pub fn fixed(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            ..Self::default()
        }
    }

    /// Computes the delay for the given restart number (0-indexed).
    ///
    /// The base delay is `first × factor^n`, clamped to [`BackoffPolicy::max`];
    /// jitter is applied to the clamped base and never feeds back.
    pub fn next(&self, restart: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = restart.min(i32::MAX as u32) as i32;
        let unclamped_secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base =
            if !unclamped_secs.is_finite() || unclamped_secs < 0.0 || unclamped_secs > max_secs {
                self.max
            } else {
                Duration::from_secs_f64(unclamped_secs)
            };

        self.jitter.apply(base)
    }
}
