//! # Runtime context shared by all processes of one supervisor.
//!
//! Bundles the pieces a [`Process`](crate::process::Process) needs beyond
//! its own config: the worker registry for resolving worker references,
//! the storage roots exported to children, and the stop timing knobs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SupervisorConfig;
use crate::runner::WorkerRegistry;

/// Shared spawn-time context, owned by the supervisor.
pub struct SpawnContext {
    /// Registered worker factories.
    pub workers: WorkerRegistry,
    /// Root of per-process scratch storage (`PUP_TEMP_STORAGE/<id>`).
    pub temp_dir: PathBuf,
    /// Root of per-process persistent storage (`PUP_DATA_STORAGE/<id>`).
    pub data_dir: PathBuf,
    /// How long `stop` waits before the graceful-terminate signal.
    pub terminate_grace: Duration,
    /// How long `stop` waits in total before the hard kill.
    pub kill_timeout: Duration,
}

impl SpawnContext {
    /// Derives a context from the global config and a worker registry.
    pub fn from_config(cfg: &SupervisorConfig, workers: WorkerRegistry) -> Arc<Self> {
        Arc::new(Self {
            workers,
            temp_dir: cfg.temp_root(),
            data_dir: cfg.data_root(),
            terminate_grace: cfg.terminate_grace,
            kill_timeout: cfg.kill_timeout,
        })
    }
}

impl Default for SpawnContext {
    fn default() -> Self {
        let cfg = SupervisorConfig::default();
        Self {
            workers: WorkerRegistry::default(),
            temp_dir: cfg.temp_root(),
            data_dir: cfg.data_root(),
            terminate_grace: cfg.terminate_grace,
            kill_timeout: cfg.kill_timeout,
        }
    }
}
