//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by processes, triggers,
//! the control responder and the supervisor.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] — closed event classification plus payload metadata
//! - [`Bus`] — thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Process`, `Cluster`, cron/watch trigger loops,
//!   the control responder, `Supervisor`, `SubscriberSet` workers.
//! - **Consumers**: the supervisor restart-policy loop, the status-file
//!   writer, `Process::stop` (awaiting its own terminal transition), and
//!   the subscriber fan-out.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
