//! Restart and delay policies.
//!
//! This module groups the knobs that control **if/when** a process is
//! restarted and **how long** the restart-policy loop waits between
//! re-entries.
//!
//! ## Contents
//! - [`RestartPolicy`] when to restart (never / on-error / always)
//! - [`BackoffPolicy`] how the restart delay evolves (first / factor / max)
//! - [`JitterPolicy`] randomization to avoid synchronized restarts
//!
//! ## Quick wiring
//! ```text
//! ProcessConfig { restart: RestartPolicy, backoff: BackoffPolicy, restart_limit }
//!      └─► supervisor restart-policy loop uses:
//!           - restart to decide re-entry after a terminal status event
//!           - backoff.next(restarts) to schedule the next start
//! ```
//!
//! ## Defaults
//! - `RestartPolicy::Never` — a declared process runs when told to.
//! - `BackoffPolicy::default()` → first=100ms, factor=1.0 (fixed delay), max=30s.
//! - `JitterPolicy::None`.

mod backoff;
mod jitter;
mod restart;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use restart::RestartPolicy;
