//! Runtime core: orchestration, control channel, status persistence.
//!
//! The only construction path is [`Supervisor::builder`]; the builder
//! validates the declared configuration and wires every unit onto one
//! shared bus.
//!
//! Internal modules:
//! - [`core`](self): supervisor, builder, restart-policy loop, shutdown drive
//! - `control`: file-IPC responder and the [`send_control`] requester
//! - `status`: throttled heartbeat/status file plus [`StatusFile::load`]
//! - `shutdown`: cross-platform termination signal wait

mod control;
mod core;
mod shutdown;
mod status;

pub use control::send_control;
pub use core::{Supervisor, SupervisorBuilder};
pub use status::StatusFile;
