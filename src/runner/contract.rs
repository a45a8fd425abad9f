//! # The execution contract shared by all runners.
//!
//! A [`Runner`] turns one process configuration into one running OS-level
//! or in-process unit and reports its outcome. Runners are created fresh
//! for every attempt and discarded when it ends; `kill` is the only way to
//! reach into a running attempt from outside.
//!
//! ## Rules
//! - `on_started` fires **exactly once**, as soon as the underlying unit
//!   exists, before output piping begins. The pid is `None` for in-process
//!   workers.
//! - After any `kill` request the outcome reports the deliberate
//!   forced-stop sentinel instead of the raw exit status, so the state
//!   machine can file a stopped attempt under "finished" rather than
//!   "errored".

use async_trait::async_trait;

use crate::error::ProcessError;

/// Exit code conventionally reported for a deliberately stopped unit.
///
/// Mirrors the `timeout(1)` convention. Callers should use
/// [`RunOutcome::is_forced_stop`] rather than comparing codes.
pub const FORCED_STOP_CODE: i32 = 124;

/// Callback invoked once when the underlying unit exists.
pub type OnStarted = Box<dyn FnOnce(Option<u32>) + Send>;

/// Signal selector for [`Runner::kill`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopSignal {
    /// Graceful terminate (SIGTERM on Unix; cooperative cancel for workers).
    Terminate,
    /// Hard kill (SIGKILL on Unix; abandons a worker future).
    Kill,
}

/// Outcome of one completed attempt.
#[derive(Clone, Copy, Debug)]
pub struct RunOutcome {
    /// Exit code, when the unit exited with one.
    pub code: Option<i32>,
    /// Terminating signal number, when the unit died on a signal.
    pub signal: Option<i32>,
    /// True only for a clean exit (code 0).
    pub success: bool,
}

impl RunOutcome {
    /// Outcome for a clean or coded exit.
    pub fn exited(code: i32, signal: Option<i32>) -> Self {
        Self {
            code: Some(code),
            signal,
            success: code == 0,
        }
    }

    /// Outcome reported after a deliberate stop.
    pub fn forced_stop(signal: Option<i32>) -> Self {
        Self {
            code: Some(FORCED_STOP_CODE),
            signal,
            success: false,
        }
    }

    /// True when this outcome is the deliberate forced-stop sentinel.
    #[inline]
    pub fn is_forced_stop(&self) -> bool {
        self.code == Some(FORCED_STOP_CODE)
    }
}

/// Uniform contract for executing one unit of work.
///
/// Implemented by [`CommandRunner`](crate::runner::CommandRunner) (OS
/// subprocess) and [`WorkerRunner`](crate::runner::WorkerRunner)
/// (registered in-process worker).
#[async_trait]
pub trait Runner: Send + Sync {
    /// Executes the unit to completion.
    ///
    /// Resolves when the unit has exited (or failed to spawn, which is an
    /// error, not an outcome). Cancellation happens through [`Runner::kill`],
    /// never by dropping this future mid-flight.
    async fn run(&self, on_started: OnStarted) -> Result<RunOutcome, ProcessError>;

    /// Requests termination of the running unit.
    ///
    /// Idempotent; safe to call before, during, or after the unit exits.
    fn kill(&self, signal: StopSignal);
}
