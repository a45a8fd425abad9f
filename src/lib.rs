//! # pup
//!
//! **pup** is a single-node process supervisor: given a declarative set of
//! process definitions it starts, monitors, restarts, clusters and
//! load-balances long-running or scheduled programs, and exposes their
//! lifecycle to external controllers through a file-based control channel.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌───────────────┐   ┌───────────────┐   ┌───────────────┐
//!     │ ProcessConfig │   │ ProcessConfig │   │ ProcessConfig │
//!     │   (command)   │   │   (worker)    │   │  (+ cluster)  │
//!     └───────┬───────┘   └───────┬───────┘   └───────┬───────┘
//!             ▼                   ▼                   ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Supervisor                                                         │
//! │  - Bus (broadcast events)                                           │
//! │  - restart-policy loop (pending marker + RestartPolicy)             │
//! │  - status writer ({pid, heartbeat, taskRegistry})                   │
//! │  - control responder (file IPC verbs)                               │
//! └──────┬──────────────────────┬──────────────────────┬────────────────┘
//!        ▼                      ▼                      ▼
//!   ┌──────────┐         ┌──────────┐          ┌───────────────┐
//!   │ Process  │         │ Process  │          │    Cluster    │
//!   │ (machine)│         │ (machine)│          │ N × Process   │
//!   └────┬─────┘         └────┬─────┘          │ + LoadBalancer│
//!        │                    │                └───────┬───────┘
//!        ▼                    ▼                        ▼
//!   CommandRunner        WorkerRunner            member runners
//!   (subprocess)         (in-process)
//!
//! Triggers per process: CronTrigger (start / terminate), Watcher
//! (debounced modify batches). Every status change, schedule, watch hit
//! and consumed control message is one typed Event on the Bus; the
//! SubscriberSet fans events out to registered subscribers (LogWriter,
//! custom sinks).
//! ```
//!
//! ### Lifecycle
//! ```text
//! start(reason)            stop(reason) → bool
//!   ├─ blocked → no-op       ├─ no attempt → false
//!   ├─ running && !overrun   ├─ Stopping, then race:
//!   │        → no-op         │    natural exit ─ observed on the bus
//!   ├─ limit hit →           │    grace elapsed ─ graceful signal
//!   │    Exhausted           │    timeout ─ hard kill
//!   └─ Starting → Running    └─ resolves when actually stopped
//!        └─ exit 0 / forced stop → Finished
//!        └─ other exit / spawn error → Errored
//!
//! Restart decisions live OUTSIDE the machine: the supervisor's
//! restart-policy loop re-enters start() after a terminal event, keyed on
//! the pending-restart marker (restart verb, watch trigger) or the
//! configured policy (always / on-error), delayed by BackoffPolicy.
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types                                   |
//! |-------------------|---------------------------------------------------------------|---------------------------------------------|
//! | **Processes**     | Declarative definitions, lifecycle state machine.             | [`ProcessConfig`], [`Process`], [`ProcessLike`] |
//! | **Clustering**    | One definition fanned out N times behind a TCP balancer.      | [`ClusterConfig`], [`Cluster`], [`LoadBalancer`] |
//! | **Triggers**      | Cron start/terminate patterns, debounced file watching.       | [`CronTrigger`], [`WatchConfig`]            |
//! | **Runners**       | Subprocesses and registered in-process workers, one contract. | [`Runner`], [`CommandRunner`], [`WorkerFn`] |
//! | **Control**       | File-based IPC verbs with per-request response files.         | [`FileIpc`], [`send_control`]               |
//! | **Status**        | Throttled heartbeat snapshots readable without the supervisor.| [`StatusFile`]                              |
//! | **Subscribers**   | Typed event bus with registered capability hooks.             | [`Subscribe`], [`Event`], [`EventKind`]     |
//!
//! ## Example
//! ```rust,no_run
//! use pup::{ProcessConfig, RestartPolicy, Supervisor, SupervisorConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sup = Supervisor::builder(SupervisorConfig::default())
//!         .with_process(
//!             ProcessConfig::new("web")
//!                 .with_cmd(["python3", "-m", "http.server", "8000"])
//!                 .with_autostart(true)
//!                 .with_restart(RestartPolicy::Always),
//!         )
//!         .with_ipc_path("/tmp/pup/control.json")
//!         .with_status_path("/tmp/pup/status.json")
//!         .build()?;
//!
//!     sup.run().await?;
//!     Ok(())
//! }
//! ```

mod balancer;
mod config;
mod error;
mod events;
mod ipc;
mod policies;
mod process;
mod runner;
mod subscribers;
mod supervisor;
mod triggers;

// ---- Public re-exports ----

pub use balancer::{Backend, LoadBalancer, Strategy};
pub use config::SupervisorConfig;
pub use error::{BalancerError, IpcError, ProcessError, RuntimeError};
pub use events::{Bus, Event, EventKind};
pub use ipc::{FileIpc, IpcMessage, TelemetryClient, ValidationError};
pub use policies::{BackoffPolicy, JitterPolicy, RestartPolicy};
pub use process::{
    Cluster, ClusterConfig, Process, ProcessConfig, ProcessLike, ProcessState, ProcessStatus,
    SpawnContext, ENV_CLUSTER_INSTANCE, ENV_CLUSTER_PORT, ENV_DATA_STORAGE, ENV_PROCESS_ID,
    ENV_TEMP_STORAGE,
};
pub use runner::{
    CommandRunner, OnStarted, RunOutcome, Runner, StopSignal, WorkerFactory, WorkerFn,
    WorkerRegistry, WorkerRunner, FORCED_STOP_CODE,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use supervisor::{send_control, StatusFile, Supervisor, SupervisorBuilder};
pub use triggers::{spawn_watcher, CronTrigger, WatchBatch, WatchConfig, WatcherHandle};
