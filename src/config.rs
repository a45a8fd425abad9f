//! # Global runtime configuration.
//!
//! [`SupervisorConfig`] centralizes the supervisor-wide knobs: shutdown
//! grace, event-bus capacity, stop timing, status persistence cadence,
//! control-channel limits and storage locations.
//!
//! Per-process settings live on
//! [`ProcessConfig`](crate::process::ProcessConfig); the defaults here are
//! inherited when a process config leaves them unset.
//!
//! ## Sentinel values
//! - `status_throttle` is a lower bound: the status file is never written
//!   more often than this, however many events arrive.
//! - `temp_dir`/`data_dir` default beneath the OS temp directory when left
//!   `None`; both are created on startup and exported to children as
//!   `PUP_TEMP_STORAGE` / `PUP_DATA_STORAGE`.

use std::path::PathBuf;
use std::time::Duration;

use crate::policies::{BackoffPolicy, RestartPolicy};

/// Global configuration for the supervisor runtime.
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Maximum time to wait for processes to stop during shutdown before
    /// reporting them stuck.
    pub grace: Duration,

    /// Capacity of the event bus broadcast ring buffer (min 1; clamped by
    /// the bus).
    pub bus_capacity: usize,

    /// How long `stop` waits for a natural exit before sending the
    /// graceful-terminate signal.
    pub terminate_grace: Duration,

    /// How long `stop` waits in total before force-killing the unit.
    /// Must exceed `terminate_grace` to leave the graceful signal a window.
    pub kill_timeout: Duration,

    /// Minimum interval between two writes of the status file.
    pub status_throttle: Duration,

    /// Interval between unconditional heartbeat writes of the status file.
    pub heartbeat_interval: Duration,

    /// Maximum age of a control message before it is rejected as stale.
    pub ipc_staleness: Duration,

    /// Size ceiling for a single control payload, in bytes.
    pub ipc_max_payload: usize,

    /// Ephemeral per-process scratch space (`PUP_TEMP_STORAGE`).
    pub temp_dir: Option<PathBuf>,

    /// Persistent per-process storage (`PUP_DATA_STORAGE`).
    pub data_dir: Option<PathBuf>,

    /// Default restart policy for processes that leave it unset.
    pub restart: RestartPolicy,

    /// Default restart-delay policy for processes that leave it unset.
    pub backoff: BackoffPolicy,
}

impl SupervisorConfig {
    /// Effective temp storage root.
    pub fn temp_root(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("pup").join("temp"))
    }

    /// Effective data storage root.
    pub fn data_root(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("pup").join("data"))
    }
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `grace = 30s`
    /// - `bus_capacity = 1024`
    /// - `terminate_grace = 5s`, `kill_timeout = 30s`
    /// - `status_throttle = 1s`, `heartbeat_interval = 5s`
    /// - `ipc_staleness = 30s`, `ipc_max_payload = 64 KiB`
    /// - `restart = RestartPolicy::Never`, `backoff = BackoffPolicy::default()`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(30),
            bus_capacity: 1024,
            terminate_grace: Duration::from_secs(5),
            kill_timeout: Duration::from_secs(30),
            status_throttle: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(5),
            ipc_staleness: Duration::from_secs(30),
            ipc_max_payload: 64 * 1024,
            temp_dir: None,
            data_dir: None,
            restart: RestartPolicy::Never,
            backoff: BackoffPolicy::default(),
        }
    }
}
