//! # Subprocess runner.
//!
//! [`CommandRunner`] executes one OS subprocess via [`tokio::process`],
//! pipes its stdout/stderr line-by-line into the logger, and supports the
//! two-stage stop protocol (graceful terminate, then hard kill).
//!
//! ## Flow
//! ```text
//! run()
//!   ├─► spawn (Stdio::piped, kill_on_drop)
//!   ├─► on_started(pid)            (exactly once, before piping)
//!   ├─► pipe stdout/stderr lines → tracing
//!   └─► loop select:
//!        ├─ child exits            → RunOutcome (code/signal/success)
//!        ├─ kill(Terminate) seen   → SIGTERM, keep waiting
//!        └─ kill(Kill) seen        → SIGKILL, await exit
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::ProcessError;
use crate::runner::contract::{OnStarted, RunOutcome, Runner, StopSignal};

/// Runner for one OS subprocess attempt.
pub struct CommandRunner {
    cmd: Vec<String>,
    cwd: Option<PathBuf>,
    env: HashMap<String, String>,
    process_id: Arc<str>,

    pid: AtomicU32,
    killed: AtomicBool,
    terminate: CancellationToken,
    force: CancellationToken,
}

impl CommandRunner {
    /// Creates a runner for one attempt of `cmd`.
    ///
    /// `process_id` is only used to tag log lines produced by the child.
    pub fn new(
        cmd: Vec<String>,
        cwd: Option<PathBuf>,
        env: HashMap<String, String>,
        process_id: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            cmd,
            cwd,
            env,
            process_id: process_id.into(),
            pid: AtomicU32::new(0),
            killed: AtomicBool::new(false),
            terminate: CancellationToken::new(),
            force: CancellationToken::new(),
        }
    }

    fn outcome(&self, status: std::process::ExitStatus) -> RunOutcome {
        let signal = exit_signal(&status);
        if self.killed.load(Ordering::SeqCst) {
            return RunOutcome::forced_stop(signal);
        }
        match status.code() {
            Some(code) => RunOutcome::exited(code, signal),
            None => RunOutcome {
                code: None,
                signal,
                success: false,
            },
        }
    }

    #[cfg(unix)]
    fn send_terminate(&self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = self.pid.load(Ordering::SeqCst);
        if pid == 0 {
            return;
        }
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            warn!(process = %self.process_id, pid, "SIGTERM failed: {e}");
        }
    }

    #[cfg(not(unix))]
    fn send_terminate(&self) {
        // No graceful signal available; escalate straight to the hard kill.
        self.force.cancel();
    }
}

#[async_trait]
impl Runner for CommandRunner {
    async fn run(&self, on_started: OnStarted) -> Result<RunOutcome, ProcessError> {
        let (program, args) = self.cmd.split_first().ok_or_else(|| ProcessError::Spawn {
            error: "empty command".into(),
        })?;

        let mut command = Command::new(program);
        command
            .args(args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|e| ProcessError::Spawn {
            error: e.to_string(),
        })?;

        let pid = child.id();
        if let Some(p) = pid {
            self.pid.store(p, Ordering::SeqCst);
        }
        debug!(process = %self.process_id, ?pid, "spawned");
        on_started(pid);

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pipe_lines(stdout, Arc::clone(&self.process_id), false));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pipe_lines(stderr, Arc::clone(&self.process_id), true));
        }

        let mut terminated = false;
        let status = loop {
            tokio::select! {
                res = child.wait() => {
                    break res.map_err(|e| ProcessError::Spawn { error: e.to_string() })?;
                }
                _ = self.terminate.cancelled(), if !terminated => {
                    terminated = true;
                    self.send_terminate();
                }
                _ = self.force.cancelled() => {
                    let _ = child.start_kill();
                    break child
                        .wait()
                        .await
                        .map_err(|e| ProcessError::Spawn { error: e.to_string() })?;
                }
            }
        };

        Ok(self.outcome(status))
    }

    fn kill(&self, signal: StopSignal) {
        self.killed.store(true, Ordering::SeqCst);
        match signal {
            StopSignal::Terminate => self.terminate.cancel(),
            StopSignal::Kill => self.force.cancel(),
        }
    }
}

/// Streams one output pipe into the logger, one record per line.
async fn pipe_lines<R: AsyncRead + Unpin>(pipe: R, process_id: Arc<str>, is_stderr: bool) {
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            error!(target: "pup::stderr", process = %process_id, "{line}");
        } else {
            info!(target: "pup::stdout", process = %process_id, "{line}");
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner_for(cmd: &[&str]) -> CommandRunner {
        CommandRunner::new(
            cmd.iter().map(|s| s.to_string()).collect(),
            None,
            HashMap::new(),
            "test",
        )
    }

    #[tokio::test]
    async fn test_clean_exit_reports_code_zero() {
        let runner = runner_for(&["true"]);
        let out = runner.run(Box::new(|_| {})).await.expect("runs");
        assert_eq!(out.code, Some(0));
        assert!(out.success);
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_code() {
        let runner = runner_for(&["false"]);
        let out = runner.run(Box::new(|_| {})).await.expect("runs");
        assert_eq!(out.code, Some(1));
        assert!(!out.success);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let runner = runner_for(&["definitely-not-a-real-binary-pup"]);
        let err = runner.run(Box::new(|_| {})).await.unwrap_err();
        assert_eq!(err.as_label(), "process_spawn_failed");
    }

    #[tokio::test]
    async fn test_on_started_receives_pid() {
        let (tx, rx) = std::sync::mpsc::channel();
        let runner = runner_for(&["true"]);
        runner
            .run(Box::new(move |pid| {
                let _ = tx.send(pid);
            }))
            .await
            .expect("runs");
        let pid = rx.recv().expect("on_started fired");
        assert!(pid.is_some());
    }

    #[tokio::test]
    async fn test_kill_reports_forced_stop() {
        let runner = Arc::new(runner_for(&["sleep", "30"]));
        let handle = {
            let r = Arc::clone(&runner);
            tokio::spawn(async move { r.run(Box::new(|_| {})).await })
        };
        // Give the child a moment to exist before killing it.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        runner.kill(StopSignal::Kill);
        let out = handle.await.expect("join").expect("outcome");
        assert!(out.is_forced_stop());
    }
}
