//! # Jitter policy for restart delays.
//!
//! [`JitterPolicy`] randomizes restart delays so that many processes
//! crashing at the same moment (a dependency going away, a cluster-wide
//! config error) do not all come back in lockstep.
//!
//! - [`JitterPolicy::None`] — exact delays, predictable timing
//! - [`JitterPolicy::Full`] — random delay in `[0, delay]`
//! - [`JitterPolicy::Equal`] — `delay/2 + random[0, delay/2]`

use rand::Rng;
use std::time::Duration;

/// Policy controlling randomization of restart delays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// No jitter: use the exact computed delay (default).
    #[default]
    None,

    /// Full jitter: random delay in `[0, delay]`. Maximum spreading; can
    /// shorten the delay down to zero.
    Full,

    /// Equal jitter: `delay/2 + random[0, delay/2]`. Keeps at least half
    /// the computed delay while still de-synchronizing restarts.
    Equal,
}

impl JitterPolicy {
    /// Applies jitter to the given delay.
    pub fn apply(&self, delay: Duration) -> Duration {
        let ms = delay.as_millis() as u64;
        if ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = rand::rng();
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => Duration::from_millis(rng.random_range(0..=ms)),
            JitterPolicy::Equal => {
                let half = ms / 2;
                let jitter = if half == 0 {
                    0
                } else {
                    rng.random_range(0..=half)
                };
                Duration::from_millis(half + jitter)
            }
        }
    }
}
