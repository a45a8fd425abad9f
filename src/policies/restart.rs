//! # Restart policies for supervised processes.
//!
//! [`RestartPolicy`] decides whether the supervisor re-enters `start` after
//! a process attempt ends. It is evaluated by the supervisor's
//! restart-policy loop, not by the process state machine itself — the
//! machine only records what happened.
//!
//! - [`RestartPolicy::Never`] — the process runs when told to and is never
//!   restarted automatically (default).
//! - [`RestartPolicy::OnError`] — restarted only when the attempt ended in
//!   the errored state.
//! - [`RestartPolicy::Always`] — restarted unconditionally after the
//!   configured delay, whatever the outcome.
//!
//! A requested restart (`restart` operation, watch trigger) bypasses the
//! policy: the pending-restart marker always re-enters `start`.

/// Policy controlling automatic re-entry into `start` after an attempt ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Never restart automatically (default).
    #[default]
    Never,
    /// Restart only after an errored attempt.
    OnError,
    /// Restart unconditionally after every attempt.
    Always,
}

impl RestartPolicy {
    /// Whether an attempt that ended with `errored == true` warrants a restart.
    #[inline]
    pub fn should_restart(self, errored: bool) -> bool {
        match self {
            RestartPolicy::Never => false,
            RestartPolicy::OnError => errored,
            RestartPolicy::Always => true,
        }
    }
}
