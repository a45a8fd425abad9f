//! # The uniform control surface over processes and clusters.
//!
//! [`ProcessLike`] is the seam between the supervisor and whatever it
//! manages: a plain [`Process`](crate::process::Process) or a
//! [`Cluster`](crate::process::Cluster) fanning the same operations out to
//! its members. Control verbs, the restart-policy loop and status
//! persistence all go through this trait and never care which one they
//! are holding.

use std::sync::Arc;

use async_trait::async_trait;

use crate::process::config::ProcessConfig;
use crate::process::state::ProcessStatus;

/// Uniform lifecycle surface of one supervised unit.
#[async_trait]
pub trait ProcessLike: Send + Sync + 'static {
    /// Unique identifier of this unit.
    fn id(&self) -> &str;

    /// The declarative definition this unit was built from.
    fn config(&self) -> &ProcessConfig;

    /// Current status snapshot (aggregated, for clusters).
    fn status(&self) -> ProcessStatus;

    /// Wires triggers (cron, watch) and emits the initial status event.
    async fn init(self: Arc<Self>);

    /// Starts the unit. A no-op (logged) when blocked, already running
    /// without overrun, or exhausted. Resolves when the attempt ends.
    async fn start(self: Arc<Self>, reason: &str, is_restart: bool);

    /// Stops the unit; `false` when nothing was running. Resolves when the
    /// unit has actually stopped, not when a signal was sent.
    async fn stop(&self, reason: &str) -> bool;

    /// Requests a stop-then-start cycle; the restart-policy loop performs
    /// the start. Does not wait for the stop.
    async fn restart(self: Arc<Self>, reason: &str);

    /// Suppresses `start` until [`ProcessLike::unblock`].
    fn block(&self, reason: &str);

    /// Lifts the suppression and resets the restart budget.
    fn unblock(&self, reason: &str);

    /// Takes (and clears) a recorded pending-restart reason.
    fn take_pending_restart(&self) -> Option<String> {
        None
    }
}
