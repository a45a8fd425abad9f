//! # Process lifecycle states and status snapshots.
//!
//! [`ProcessState`] is the numeric state of the per-process machine. The
//! discriminants are deliberately sparse (0, 100, 200, ...) so that new
//! states can be inserted between existing ones without renumbering
//! persisted snapshots; the gaps are part of the contract.
//!
//! [`ProcessStatus`] is the mutable status owned exclusively by the process
//! that produced it and read by everyone else (status file, control
//! responder, cluster aggregation).
//!
//! ## Rules
//! - `pid` is set only while the state is [`ProcessState::Running`].
//! - `restarts` resets to 0 on manual stop, on every successful cron fire,
//!   and on unblock.
//! - `blocked` is orthogonal to the numeric state: it never overwrites it,
//!   it only suppresses `start`. The [`ProcessState::Blocked`] value exists
//!   so cluster aggregation and snapshots can report the condition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a supervised process.
///
/// Transition graph:
/// ```text
/// Created ──► Starting ──► Running ──► Stopping ──► Finished
///                │                        │
///                │                        └────────► Errored
///                └── restart limit hit ──────────► Exhausted (terminal)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u16)]
pub enum ProcessState {
    /// Known to the supervisor, never started.
    Created = 0,
    /// A start was accepted; the runner is being brought up.
    Starting = 100,
    /// The underlying OS process or worker is alive.
    Running = 200,
    /// A stop was accepted; waiting for the unit to exit.
    Stopping = 250,
    /// Exited cleanly (code 0) or via a deliberate forced stop.
    Finished = 300,
    /// Exited with a non-zero code, on a signal, or failed to spawn.
    Errored = 400,
    /// Restart limit reached; further starts are refused.
    Exhausted = 450,
    /// Aggregate-only: every member of a cluster is blocked.
    Blocked = 500,
}

impl ProcessState {
    /// True for states that mean "no attempt is in flight anymore".
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessState::Finished | ProcessState::Errored | ProcessState::Exhausted
        )
    }
}

/// Mutable status snapshot of a single process.
///
/// Owned by the [`Process`](crate::process::Process) that produces it;
/// cloned out for readers. Serialized into the status file under the
/// process id.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStatus {
    /// Current lifecycle state.
    pub state: ProcessState,
    /// OS pid of the running unit; `None` unless state is `Running`.
    pub pid: Option<u32>,
    /// Exit code of the last completed attempt.
    pub exit_code: Option<i32>,
    /// Terminating signal of the last completed attempt, if any.
    pub exit_signal: Option<i32>,
    /// When the last attempt entered `Running`.
    pub started_at: Option<DateTime<Utc>>,
    /// When the last attempt exited.
    pub exited_at: Option<DateTime<Utc>>,
    /// Restarts consumed against the restart limit.
    pub restarts: u32,
    /// Wall-clock time of the last mutation of this snapshot.
    pub updated_at: DateTime<Utc>,
    /// Reason of a requested restart awaiting the restart-policy loop.
    pub pending_restart_reason: Option<String>,
    /// Whether `start` is currently suppressed.
    pub blocked: bool,
}

impl Default for ProcessStatus {
    fn default() -> Self {
        Self {
            state: ProcessState::Created,
            pid: None,
            exit_code: None,
            exit_signal: None,
            started_at: None,
            exited_at: None,
            restarts: 0,
            updated_at: Utc::now(),
            pending_restart_reason: None,
            blocked: false,
        }
    }
}
