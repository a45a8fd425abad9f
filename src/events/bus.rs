//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] providing
//! non-blocking publishing from multiple sources (processes, triggers,
//! the control responder, the supervisor itself).
//!
//! ```text
//! Publishers (many):                    Consumers:
//!   Process 1 ──┐
//!   Process N ──┼──────► Bus ─────┬──► supervisor restart-policy loop
//!   Triggers  ──┤  (broadcast)    ├──► status-file writer
//!   Control   ──┘                 └──► SubscriberSet fan-out
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks or awaits.
//! - **Bounded capacity**: one ring buffer of recent events for all receivers.
//! - **Lag handling**: slow receivers observe `RecvError::Lagged(n)` and skip
//!   the `n` oldest items.
//! - **No persistence**: events published while nobody listens are dropped.
//!
//! Status-changed events for a given process are published in the exact
//! order its state transitions occur; the bus preserves that order for
//! every receiver.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events.
///
/// Cheap to clone (internally an `Arc`-backed sender); every receiver gets
/// its own cursor into the shared ring buffer.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to ≥ 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers the event is dropped; the call still
    /// returns immediately.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver observing events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
