//! File-based inter-process communication.
//!
//! Lets external CLI invocations and sibling processes talk to a running
//! supervisor without sockets: a shared JSON file is the queue, delivery
//! is at-least-once best-effort, and staleness/size validation guards
//! against acting on leftovers.
//!
//! ## Contents
//! - [`FileIpc`] — the shared-file queue endpoint (send / receive / close)
//! - [`IpcMessage`], [`ValidationError`] — consumed messages and their
//!   per-message validation tags
//! - [`TelemetryClient`] — explicit client handle for spawned children

mod file_ipc;
mod message;
mod telemetry;

pub use file_ipc::FileIpc;
pub use message::{IpcMessage, ValidationError};
pub use telemetry::TelemetryClient;
