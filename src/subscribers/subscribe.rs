//! # The subscriber capability interface.
//!
//! `Subscribe` is the fixed extension point for hooking external
//! collaborators into the runtime: loggers, status sinks, alerting — any
//! plugin-shaped concern. Implementations are **registered explicitly** on
//! the [`SupervisorBuilder`](crate::supervisor::SupervisorBuilder) at
//! startup; there is no discovery or dynamic loading.
//!
//! ## Contract
//! - Implementations may be slow (I/O, batching, retries) — they never
//!   block the publisher nor other subscribers; each one is driven by a
//!   dedicated worker loop fed by a bounded queue owned by the
//!   [`SubscriberSet`](crate::subscribers::SubscriberSet).
//! - On queue overflow, events for that subscriber are dropped and a
//!   `SubscriberOverflow` event is published.
//! - [`Subscribe::cleanup`] runs once at supervisor shutdown, after the
//!   last event was delivered.

use async_trait::async_trait;

use crate::events::Event;

/// Contract for event subscribers.
///
/// Called from a subscriber-dedicated worker task. Implementations should
/// avoid blocking the async runtime (prefer async I/O and cooperative
/// waits).
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles a single event for this subscriber.
    async fn on_event(&self, event: &Event);

    /// Human-readable name (metadata, used in logs and overflow events).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }

    /// Final hook at supervisor shutdown (flush buffers, close files).
    async fn cleanup(&self) {}
}
