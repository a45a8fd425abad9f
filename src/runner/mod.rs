//! Execution strategies for one unit of work.
//!
//! A runner is created fresh for every single attempt and discarded when
//! the attempt ends; the owning [`Process`](crate::process::Process) picks
//! the variant by the shape of its config (worker reference present → in
//! process, otherwise subprocess).
//!
//! ## Contents
//! - [`Runner`], [`RunOutcome`], [`StopSignal`], [`FORCED_STOP_CODE`] — the contract
//! - [`CommandRunner`] — OS subprocess via `tokio::process`
//! - [`WorkerRunner`], [`WorkerFactory`], [`WorkerFn`], [`WorkerRegistry`] — in-process work

mod command;
mod contract;
mod worker;

pub use command::CommandRunner;
pub use contract::{OnStarted, RunOutcome, Runner, StopSignal, FORCED_STOP_CODE};
pub use worker::{WorkerFactory, WorkerFn, WorkerRegistry, WorkerRunner};
