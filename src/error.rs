//! Error types used by the pup runtime and its components.
//!
//! This module defines one error enum per layer:
//!
//! - [`RuntimeError`] — errors raised by the supervisor runtime itself.
//! - [`ProcessError`] — errors raised while executing one process attempt.
//! - [`IpcError`] — errors on the file-based control channel.
//! - [`BalancerError`] — errors raised by the load balancer.
//!
//! The enums provide `as_label()` helpers (short snake_case tags for
//! logs) in addition to their `Display` implementations.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by the supervisor runtime.
///
/// These represent failures of the orchestration system itself: an invalid
/// declared configuration (which aborts startup) or a shutdown sequence that
/// exceeded its grace period.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The declared configuration is inconsistent; startup is aborted.
    #[error("invalid configuration: {reason}")]
    Config {
        /// Human-readable description of the inconsistency.
        reason: String,
    },

    /// Shutdown grace period was exceeded; some processes remained stuck.
    #[error("shutdown grace {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Ids of processes that did not stop in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Config { .. } => "runtime_config_invalid",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::Config { reason } => format!("configuration rejected: {reason}"),
            RuntimeError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck processes={stuck:?}")
            }
        }
    }
}

/// Errors produced while executing a single process attempt.
///
/// These are contained per attempt: the state machine maps them to the
/// errored state with a synthetic exit code and the restart policy decides
/// what happens next. They never crash the supervisor.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The OS process could not be spawned (command not found, permissions).
    #[error("spawn failed: {error}")]
    Spawn {
        /// The underlying error message.
        error: String,
    },

    /// An in-process worker returned an execution error.
    #[error("worker failed: {error}")]
    Worker {
        /// The underlying error message.
        error: String,
    },

    /// A worker reference did not resolve to a registered worker.
    #[error("no worker registered under {name:?}")]
    UnknownWorker {
        /// The unresolved worker name.
        name: String,
    },

    /// A cron pattern could not be parsed; the trigger is disabled.
    #[error("invalid cron pattern {pattern:?}: {error}")]
    CronPattern {
        /// The rejected pattern.
        pattern: String,
        /// Parser error message.
        error: String,
    },

    /// The filesystem watcher could not be installed.
    #[error("watch setup failed: {error}")]
    Watch {
        /// The underlying error message.
        error: String,
    },
}

impl ProcessError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProcessError::Spawn { .. } => "process_spawn_failed",
            ProcessError::Worker { .. } => "process_worker_failed",
            ProcessError::UnknownWorker { .. } => "process_worker_unknown",
            ProcessError::CronPattern { .. } => "process_cron_invalid",
            ProcessError::Watch { .. } => "process_watch_failed",
        }
    }
}

/// Errors on the file-based control channel.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum IpcError {
    /// Reading or writing the shared file failed.
    #[error("ipc io on {path:?}: {error}")]
    Io {
        /// Path of the shared file.
        path: PathBuf,
        /// The underlying error message.
        error: String,
    },

    /// The payload exceeds the configured size ceiling.
    #[error("payload of {len} bytes exceeds ceiling of {max}")]
    Oversized {
        /// Actual payload length in bytes.
        len: usize,
        /// Configured ceiling.
        max: usize,
    },

    /// No response file appeared within the polling window.
    #[error("no response within {timeout:?}")]
    ResponseTimeout {
        /// The polling window that elapsed.
        timeout: Duration,
    },
}

impl IpcError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            IpcError::Io { .. } => "ipc_io",
            IpcError::Oversized { .. } => "ipc_oversized",
            IpcError::ResponseTimeout { .. } => "ipc_response_timeout",
        }
    }
}

/// Errors raised by the load balancer.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BalancerError {
    /// The balancer was started with an empty backend list.
    #[error("cannot start with zero backends")]
    NoBackends,

    /// Binding the listening socket failed.
    #[error("bind on port {port} failed: {error}")]
    Bind {
        /// Requested listen port.
        port: u16,
        /// The underlying error message.
        error: String,
    },
}

impl BalancerError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            BalancerError::NoBackends => "balancer_no_backends",
            BalancerError::Bind { .. } => "balancer_bind_failed",
        }
    }
}
