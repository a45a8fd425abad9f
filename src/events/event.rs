//! # Runtime events emitted by the supervisor and its processes.
//!
//! [`EventKind`] is a closed set: every cross-cutting notification in the
//! runtime is one of these variants, never an untyped string/payload pair.
//! The [`Event`] struct carries the optional metadata a variant sets
//! (process id, state, reason, pid, exit code, delay).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. For one process, `ProcessStatusChanged` events are
//! published in transition order; `seq` lets consumers restore the global
//! order when merging streams.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::process::ProcessState;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Process lifecycle ===
    /// A process status snapshot changed (state transition, blocked flag,
    /// pid appearing or clearing).
    ///
    /// Sets: `process`, `status`, `reason`; `pid`/`code` when known.
    ProcessStatusChanged,

    /// A start was scheduled for a process: a cron trigger fired, or the
    /// restart-policy loop queued a delayed re-entry.
    ///
    /// Sets: `process`, `reason` (pattern or restart reason); `delay_ms`
    /// for restart re-entries.
    ProcessScheduled,

    /// A watched path set produced a batch containing a modify event.
    ///
    /// Sets: `process`, `reason` (first changed path).
    WatchTriggered,

    // === Control channel ===
    /// A valid message was consumed from the control file.
    ///
    /// Sets: `reason` (the raw payload), `pid` (sender pid).
    IpcReceived,

    // === Supervisor lifecycle ===
    /// Shutdown requested (OS signal or `terminate` control verb).
    ShutdownRequested,

    /// All processes stopped within the configured grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some processes had to be abandoned.
    GraceExceeded,

    // === Subscriber plumbing ===
    /// A subscriber queue overflowed and dropped an event.
    ///
    /// Sets: `process` (subscriber name), `reason` ("full" / "closed").
    SubscriberOverflow,

    /// A subscriber panicked while handling an event.
    ///
    /// Sets: `process` (subscriber name), `reason` (panic info).
    SubscriberPanicked,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Process id (or subscriber name for subscriber plumbing events).
    pub process: Option<Arc<str>>,
    /// State carried by `ProcessStatusChanged`.
    pub status: Option<ProcessState>,
    /// Human-readable reason (start/stop reasons, payloads, panic info).
    pub reason: Option<Arc<str>>,
    /// OS pid, where applicable.
    pub pid: Option<u32>,
    /// Exit code, where applicable.
    pub code: Option<i32>,
    /// Scheduled delay in milliseconds (restart-policy loop).
    pub delay_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            process: None,
            status: None,
            reason: None,
            pid: None,
            code: None,
            delay_ms: None,
        }
    }

    /// Attaches a process id (or subscriber name).
    #[inline]
    pub fn with_process(mut self, id: impl Into<Arc<str>>) -> Self {
        self.process = Some(id.into());
        self
    }

    /// Attaches a lifecycle state.
    #[inline]
    pub fn with_status(mut self, state: ProcessState) -> Self {
        self.status = Some(state);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an OS pid.
    #[inline]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches an exit code.
    #[inline]
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    /// Attaches a scheduling delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// True when this event is a status change for the given process id.
    #[inline]
    pub fn is_status_of(&self, id: &str) -> bool {
        self.kind == EventKind::ProcessStatusChanged && self.process.as_deref() == Some(id)
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::now(EventKind::SubscriberOverflow)
            .with_process(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::now(EventKind::SubscriberPanicked)
            .with_process(subscriber)
            .with_reason(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::now(EventKind::ShutdownRequested);
        let b = Event::now(EventKind::ShutdownRequested);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_builder_sets_fields() {
        let ev = Event::now(EventKind::ProcessStatusChanged)
            .with_process("web")
            .with_status(ProcessState::Running)
            .with_reason("autostart")
            .with_pid(4242);
        assert!(ev.is_status_of("web"));
        assert!(!ev.is_status_of("db"));
        assert_eq!(ev.status, Some(ProcessState::Running));
        assert_eq!(ev.pid, Some(4242));
        assert_eq!(ev.reason.as_deref(), Some("autostart"));
    }
}
