//! # Process: the per-unit lifecycle state machine.
//!
//! One [`Process`] owns one attempt at a time of the unit its config
//! declares, plus the triggers that re-enter its lifecycle (cron start,
//! cron terminate, watch). It publishes every status change on the bus in
//! strict transition order; restart decisions are **not** made here but in
//! the supervisor's restart-policy loop, keyed on the pending-restart
//! marker and the configured policy.
//!
//! ## State machine
//! ```text
//! start(reason, is_restart)
//!   ├─ blocked           → no-op (logged)
//!   ├─ attempt in flight
//!   │    and !overrun    → no-op (logged)
//!   ├─ restarts ≥ limit  → Exhausted (terminal)
//!   └─ else:
//!        Starting ──► runner spawned ──► Running (pid, pid-file)
//!                        │
//!                        ├─ code 0 / forced stop  → Finished
//!                        ├─ other code / signal   → Errored
//!                        └─ spawn error           → Errored (code 1)
//!
//! stop(reason) → bool
//!   no runner → false
//!   else: Stopping, then race
//!     ├─ natural exit observed on the bus        → resolve true
//!     ├─ after terminate_grace: graceful signal  → keep waiting
//!     └─ after kill_timeout:   hard kill         → keep waiting
//!   (at most one of signal/kill fires in the common path; both are
//!    skipped when the unit exits first)
//! ```
//!
//! ## Rules
//! - Status mutation and event publishing happen under the same guard, so
//!   observers see transitions in the exact order they occurred.
//! - `pid` is set only while `Running`; cleared on exit.
//! - `restarts` resets on manual stop, on every cron fire, and on unblock.
//! - Trigger tasks hang off the process token and die with the supervisor;
//!   they never keep it alive.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::events::{Bus, Event, EventKind};
use crate::process::config::{
    ProcessConfig, ENV_DATA_STORAGE, ENV_PROCESS_ID, ENV_TEMP_STORAGE,
};
use crate::process::context::SpawnContext;
use crate::process::like::ProcessLike;
use crate::process::state::{ProcessState, ProcessStatus};
use crate::runner::{CommandRunner, Runner, StopSignal, WorkerRunner};
use crate::triggers::{spawn_watcher, CronTrigger};

/// Lifecycle state machine for a single logical unit.
pub struct Process {
    config: ProcessConfig,
    ctx: Arc<SpawnContext>,
    bus: Bus,
    token: CancellationToken,
    /// Extra environment injected by a wrapping cluster.
    env_extra: HashMap<String, String>,

    status: RwLock<ProcessStatus>,
    runner: RwLock<Option<Arc<dyn Runner>>>,
}

impl Process {
    /// Creates a process in the `Created` state.
    ///
    /// `token` bounds the lifetime of the triggers wired by
    /// [`init`](ProcessLike::init); cancel it to tear them down.
    pub fn new(
        config: ProcessConfig,
        bus: Bus,
        ctx: Arc<SpawnContext>,
        token: CancellationToken,
    ) -> Arc<Self> {
        Self::with_extra_env(config, bus, ctx, token, HashMap::new())
    }

    /// Creates a cluster member carrying its identity environment pair.
    pub(crate) fn with_extra_env(
        config: ProcessConfig,
        bus: Bus,
        ctx: Arc<SpawnContext>,
        token: CancellationToken,
        env_extra: HashMap<String, String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            ctx,
            bus,
            token,
            env_extra,
            status: RwLock::new(ProcessStatus::default()),
            runner: RwLock::new(None),
        })
    }

    /// Mutates the status snapshot and publishes the change, both under
    /// the same guard so transition order is preserved on the bus.
    fn update_status(&self, reason: &str, mutate: impl FnOnce(&mut ProcessStatus)) {
        let guard = &mut *self.status.write().unwrap_or_else(|e| e.into_inner());
        mutate(guard);
        guard.updated_at = Utc::now();

        let mut ev = Event::now(EventKind::ProcessStatusChanged)
            .with_process(self.config.id.as_str())
            .with_status(guard.state)
            .with_reason(reason);
        if let Some(pid) = guard.pid {
            ev = ev.with_pid(pid);
        }
        if let Some(code) = guard.exit_code {
            ev = ev.with_code(code);
        }
        self.bus.publish(ev);
    }

    /// Mutates the snapshot without publishing (non-transition bookkeeping).
    fn mutate_silently(&self, mutate: impl FnOnce(&mut ProcessStatus)) {
        let guard = &mut *self.status.write().unwrap_or_else(|e| e.into_inner());
        mutate(guard);
        guard.updated_at = Utc::now();
    }

    fn snapshot(&self) -> ProcessStatus {
        self.status.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Builds the environment a spawned command sees on top of the
    /// inherited one: config overrides, cluster identity, then the
    /// supervisor-injected identity and storage variables.
    fn spawn_env(&self) -> HashMap<String, String> {
        let id = &self.config.id;
        let temp = self.ctx.temp_dir.join(id);
        let data = self.ctx.data_dir.join(id);
        for dir in [&temp, &data] {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!(process = %id, path = %dir.display(), "storage dir: {e}");
            }
        }

        let mut env = self.config.env.clone();
        env.extend(self.env_extra.clone());
        env.insert(ENV_PROCESS_ID.into(), id.clone());
        env.insert(ENV_TEMP_STORAGE.into(), temp.display().to_string());
        env.insert(ENV_DATA_STORAGE.into(), data.display().to_string());
        env
    }

    fn make_runner(&self) -> Result<Arc<dyn Runner>, crate::error::ProcessError> {
        if let Some(worker) = &self.config.worker {
            let factory = self.ctx.workers.get(worker).ok_or_else(|| {
                crate::error::ProcessError::UnknownWorker {
                    name: worker.clone(),
                }
            })?;
            Ok(Arc::new(WorkerRunner::new(factory)))
        } else {
            Ok(Arc::new(CommandRunner::new(
                self.config.cmd.clone(),
                self.config.cwd.clone(),
                self.spawn_env(),
                self.config.id.as_str(),
            )))
        }
    }

    fn write_pid_file(&self, pid: u32) {
        if let Some(path) = &self.config.pid_file {
            if let Err(e) = std::fs::write(path, pid.to_string()) {
                warn!(process = %self.config.id, path = %path.display(), "pid file: {e}");
            }
        }
    }

    fn remove_pid_file(&self) {
        if let Some(path) = &self.config.pid_file {
            let _ = std::fs::remove_file(path);
        }
    }

    /// Wires the start-cron loop.
    fn spawn_cron_start(me: &Arc<Self>, pattern: &str) {
        let trigger = match CronTrigger::new(pattern) {
            Ok(t) => t,
            Err(e) => {
                error!(process = %me.config.id, "start cron disabled: {e}");
                return;
            }
        };
        info!(
            process = %me.config.id,
            pattern = trigger.pattern(),
            next = ?trigger.next_fire(),
            "cron start scheduled"
        );
        let me = Arc::clone(me);
        let token = me.token.clone();
        tokio::spawn(async move {
            while let Some(fired) = trigger.wait_next(&token).await {
                // A scheduled process earns a fresh restart budget per cycle.
                me.mutate_silently(|st| st.restarts = 0);
                me.bus.publish(
                    Event::now(EventKind::ProcessScheduled)
                        .with_process(me.config.id.as_str())
                        .with_reason(trigger.pattern()),
                );
                let attempt = Arc::clone(&me);
                tokio::spawn(async move {
                    ProcessLike::start(attempt, "Cron pattern", false).await;
                });
                info!(
                    process = %me.config.id,
                    fired = %fired,
                    next = ?trigger.next_fire(),
                    "cron fired"
                );
            }
        });
    }

    /// Wires the terminate-cron loop.
    fn spawn_cron_terminate(me: &Arc<Self>, pattern: &str) {
        let trigger = match CronTrigger::new(pattern) {
            Ok(t) => t,
            Err(e) => {
                error!(process = %me.config.id, "terminate cron disabled: {e}");
                return;
            }
        };
        info!(
            process = %me.config.id,
            pattern = trigger.pattern(),
            next = ?trigger.next_fire(),
            "cron termination scheduled"
        );
        let me = Arc::clone(me);
        let token = me.token.clone();
        tokio::spawn(async move {
            while trigger.wait_next(&token).await.is_some() {
                let target = Arc::clone(&me);
                tokio::spawn(async move {
                    target.stop("Cron termination").await;
                });
                info!(
                    process = %me.config.id,
                    next = ?trigger.next_fire(),
                    "cron termination fired"
                );
            }
        });
    }

    /// Wires the watch loop: a modify batch resets the restart budget and
    /// requests a restart, re-using the same re-entry path as crashes.
    fn spawn_watch(me: &Arc<Self>) {
        let Some(watch_cfg) = &me.config.watch else {
            return;
        };
        let (handle, mut rx) = match spawn_watcher(watch_cfg, me.token.child_token()) {
            Ok(pair) => pair,
            Err(e) => {
                error!(process = %me.config.id, "watch disabled: {e}");
                return;
            }
        };
        let me = Arc::clone(me);
        tokio::spawn(async move {
            let _keep_alive = handle;
            while let Some(batch) = rx.recv().await {
                if !batch.has_modify() {
                    continue;
                }
                me.mutate_silently(|st| st.restarts = 0);
                let mut ev = Event::now(EventKind::WatchTriggered)
                    .with_process(me.config.id.as_str());
                if let Some(path) = batch.first_path() {
                    ev = ev.with_reason(path.display().to_string());
                }
                me.bus.publish(ev);
                ProcessLike::restart(Arc::clone(&me), "watch").await;
            }
        });
    }
}

#[async_trait]
impl ProcessLike for Process {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn config(&self) -> &ProcessConfig {
        &self.config
    }

    fn status(&self) -> ProcessStatus {
        self.snapshot()
    }

    async fn init(self: Arc<Self>) {
        // Initial status event, before any trigger can fire.
        self.update_status("created", |_| {});

        if let Some(pattern) = self.config.cron.clone() {
            Self::spawn_cron_start(&self, &pattern);
        }
        if let Some(pattern) = self.config.terminate_cron.clone() {
            Self::spawn_cron_terminate(&self, &pattern);
        }
        Self::spawn_watch(&self);
    }

    async fn start(self: Arc<Self>, reason: &str, is_restart: bool) {
        let st = self.snapshot();
        if st.blocked {
            info!(process = %self.config.id, reason, "start skipped: blocked");
            return;
        }
        let in_flight = matches!(
            st.state,
            ProcessState::Starting | ProcessState::Running | ProcessState::Stopping
        );
        if in_flight && !self.config.overrun {
            info!(process = %self.config.id, reason, "start skipped: already running");
            return;
        }
        if let Some(limit) = self.config.restart_limit {
            if st.restarts >= limit {
                info!(process = %self.config.id, limit, "restart limit reached");
                self.update_status("restart limit reached", |st| {
                    st.state = ProcessState::Exhausted;
                });
                return;
            }
        }

        info!(process = %self.config.id, reason, is_restart, "starting");
        self.update_status(reason, |st| {
            st.state = ProcessState::Starting;
            st.pid = None;
            st.exit_code = None;
            st.exit_signal = None;
            st.started_at = None;
            st.exited_at = None;
            if is_restart {
                st.restarts += 1;
            }
        });

        let runner = match self.make_runner() {
            Ok(runner) => runner,
            Err(e) => {
                error!(process = %self.config.id, "{e}");
                self.update_status(e.as_label(), |st| {
                    st.state = ProcessState::Errored;
                    st.exit_code = Some(1);
                    st.exited_at = Some(Utc::now());
                });
                return;
            }
        };
        *self.runner.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&runner));

        let on_started = {
            let me = Arc::clone(&self);
            Box::new(move |pid: Option<u32>| {
                me.update_status("running", |st| {
                    st.state = ProcessState::Running;
                    st.pid = pid;
                    st.started_at = Some(Utc::now());
                });
                if let Some(pid) = pid {
                    me.write_pid_file(pid);
                }
            })
        };

        let result = runner.run(on_started).await;
        *self.runner.write().unwrap_or_else(|e| e.into_inner()) = None;
        self.remove_pid_file();

        match result {
            Ok(out) if out.success || out.is_forced_stop() => {
                self.update_status("finished", |st| {
                    st.state = ProcessState::Finished;
                    st.pid = None;
                    st.exit_code = out.code;
                    st.exit_signal = out.signal;
                    st.exited_at = Some(Utc::now());
                });
            }
            Ok(out) => {
                self.update_status("errored", |st| {
                    st.state = ProcessState::Errored;
                    st.pid = None;
                    st.exit_code = out.code;
                    st.exit_signal = out.signal;
                    st.exited_at = Some(Utc::now());
                });
            }
            Err(e) => {
                error!(process = %self.config.id, "{e}");
                self.update_status(e.as_label(), |st| {
                    st.state = ProcessState::Errored;
                    st.pid = None;
                    st.exit_code = Some(1);
                    st.exited_at = Some(Utc::now());
                });
            }
        }
    }

    async fn stop(&self, reason: &str) -> bool {
        let runner = self
            .runner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let Some(runner) = runner else {
            return false;
        };

        // Subscribe before transitioning so the terminal event cannot slip
        // past between the state change and the wait below.
        let mut rx = self.bus.subscribe();
        info!(process = %self.config.id, reason, "stopping");
        self.update_status(reason, |st| st.state = ProcessState::Stopping);

        let grace = tokio::time::sleep(self.ctx.terminate_grace);
        let deadline = tokio::time::sleep(self.ctx.kill_timeout);
        tokio::pin!(grace, deadline);
        let mut terminated = false;
        let mut killed = false;

        loop {
            if self.snapshot().state.is_terminal() {
                break;
            }
            tokio::select! {
                ev = rx.recv() => match ev {
                    Ok(ev) => {
                        if ev.is_status_of(&self.config.id)
                            && ev.status.map(ProcessState::is_terminal).unwrap_or(false)
                        {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
                _ = &mut grace, if !terminated => {
                    terminated = true;
                    info!(process = %self.config.id, "grace elapsed, sending terminate");
                    runner.kill(StopSignal::Terminate);
                }
                _ = &mut deadline, if !killed => {
                    killed = true;
                    warn!(process = %self.config.id, "kill timeout elapsed, forcing");
                    runner.kill(StopSignal::Kill);
                }
            }
        }

        // A manual stop clears the restart budget; a stop that is half of a
        // requested restart keeps it (the pending marker is still set).
        if self
            .snapshot()
            .pending_restart_reason
            .is_none()
        {
            self.mutate_silently(|st| st.restarts = 0);
        }
        true
    }

    async fn restart(self: Arc<Self>, reason: &str) {
        info!(process = %self.config.id, reason, "restart requested");
        self.mutate_silently(|st| st.pending_restart_reason = Some(reason.to_string()));

        let me = Arc::clone(&self);
        let reason = reason.to_string();
        tokio::spawn(async move {
            let stopped = me.stop("restart").await;
            if !stopped {
                // Nothing was running: there is no terminal event for the
                // restart-policy loop to react to, so re-enter directly.
                me.mutate_silently(|st| st.pending_restart_reason = None);
                ProcessLike::start(Arc::clone(&me), &reason, false).await;
            }
        });
    }

    fn block(&self, reason: &str) {
        info!(process = %self.config.id, reason, "blocked");
        self.update_status(reason, |st| st.blocked = true);
    }

    fn unblock(&self, reason: &str) {
        info!(process = %self.config.id, reason, "unblocked");
        self.update_status(reason, |st| {
            st.blocked = false;
            st.restarts = 0;
        });
    }

    fn take_pending_restart(&self) -> Option<String> {
        let guard = &mut *self.status.write().unwrap_or_else(|e| e.into_inner());
        guard.pending_restart_reason.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn quick_ctx() -> Arc<SpawnContext> {
        let tmp = std::env::temp_dir().join("pup-tests");
        Arc::new(SpawnContext {
            workers: crate::runner::WorkerRegistry::default(),
            temp_dir: tmp.join("temp"),
            data_dir: tmp.join("data"),
            terminate_grace: Duration::from_millis(100),
            kill_timeout: Duration::from_secs(5),
        })
    }

    fn proc_with(config: ProcessConfig) -> (Arc<Process>, Bus) {
        let bus = Bus::new(256);
        let p = Process::new(config, bus.clone(), quick_ctx(), CancellationToken::new());
        (p, bus)
    }

    #[tokio::test]
    async fn test_clean_exit_finishes() {
        let (p, _bus) = proc_with(ProcessConfig::new("ok").with_cmd(["true"]));
        ProcessLike::start(Arc::clone(&p), "test", false).await;
        let st = p.status();
        assert_eq!(st.state, ProcessState::Finished);
        assert_eq!(st.exit_code, Some(0));
        assert!(st.pid.is_none(), "pid cleared after exit");
        assert!(st.exited_at.is_some());
    }

    #[tokio::test]
    async fn test_failing_exit_errors() {
        let (p, _bus) = proc_with(ProcessConfig::new("bad").with_cmd(["false"]));
        ProcessLike::start(Arc::clone(&p), "test", false).await;
        assert_eq!(p.status().state, ProcessState::Errored);
        assert_eq!(p.status().exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_spawn_failure_errors_with_synthetic_code() {
        let (p, _bus) = proc_with(ProcessConfig::new("ghost").with_cmd(["no-such-binary-pup"]));
        ProcessLike::start(Arc::clone(&p), "test", false).await;
        let st = p.status();
        assert_eq!(st.state, ProcessState::Errored);
        assert_eq!(st.exit_code, Some(1));
    }

    #[tokio::test]
    async fn test_block_suppresses_start_until_unblock() {
        let (p, _bus) = proc_with(ProcessConfig::new("gated").with_cmd(["true"]));
        p.block("operator");
        ProcessLike::start(Arc::clone(&p), "test", false).await;
        let st = p.status();
        assert_eq!(st.state, ProcessState::Created, "state untouched by start");
        assert!(st.blocked);

        p.unblock("operator");
        ProcessLike::start(Arc::clone(&p), "test", false).await;
        assert_eq!(p.status().state, ProcessState::Finished);
    }

    #[tokio::test]
    async fn test_restart_limit_exhausts_after_exactly_limit_restarts() {
        let limit = 3u32;
        let (p, _bus) = proc_with(
            ProcessConfig::new("flaky")
                .with_cmd(["false"])
                .with_restart_limit(limit),
        );
        // Initial start plus `limit` restarts succeed in entering the runner.
        ProcessLike::start(Arc::clone(&p), "test", false).await;
        for _ in 0..limit {
            ProcessLike::start(Arc::clone(&p), "retry", true).await;
            assert_eq!(p.status().state, ProcessState::Errored);
        }
        assert_eq!(p.status().restarts, limit);

        // The next start is a no-op that lands in Exhausted…
        ProcessLike::start(Arc::clone(&p), "retry", true).await;
        assert_eq!(p.status().state, ProcessState::Exhausted);
        assert_eq!(p.status().restarts, limit);

        // …and further starts stay no-ops.
        ProcessLike::start(Arc::clone(&p), "retry", true).await;
        assert_eq!(p.status().state, ProcessState::Exhausted);
    }

    #[tokio::test]
    async fn test_stop_without_runner_is_false() {
        let (p, _bus) = proc_with(ProcessConfig::new("idle").with_cmd(["true"]));
        assert!(!p.stop("nothing to do").await);
    }

    #[tokio::test]
    async fn test_stop_terminates_long_running_child() {
        let (p, _bus) = proc_with(ProcessConfig::new("sleeper").with_cmd(["sleep", "30"]));
        let handle = tokio::spawn(ProcessLike::start(Arc::clone(&p), "test", false));
        // Wait until the child reports running.
        for _ in 0..100 {
            if p.status().state == ProcessState::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(p.status().state, ProcessState::Running);

        let stopped = p.stop("operator").await;
        assert!(stopped, "stop resolves only once actually stopped");
        assert_eq!(p.status().state, ProcessState::Finished, "forced stop files as finished");
        assert_eq!(p.status().restarts, 0, "manual stop clears the budget");
        handle.await.expect("start task joins");
    }

    #[tokio::test]
    async fn test_second_start_without_overrun_is_noop() {
        let (p, _bus) = proc_with(ProcessConfig::new("single").with_cmd(["sleep", "30"]));
        let handle = tokio::spawn(ProcessLike::start(Arc::clone(&p), "test", false));
        for _ in 0..100 {
            if p.status().state == ProcessState::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let pid_before = p.status().pid;
        ProcessLike::start(Arc::clone(&p), "again", false).await;
        assert_eq!(p.status().pid, pid_before, "no second attempt spawned");
        p.stop("cleanup").await;
        handle.await.expect("join");
    }

    #[tokio::test]
    async fn test_worker_reference_runs_registered_factory() {
        let mut workers = crate::runner::WorkerRegistry::default();
        workers.register(
            "tick",
            crate::runner::WorkerFn::arc(|_ctx| async { Ok(0) }),
        );
        let ctx = Arc::new(SpawnContext {
            workers,
            ..SpawnContext::default()
        });
        let bus = Bus::new(64);
        let p = Process::new(
            ProcessConfig::new("ticker").with_worker("tick"),
            bus,
            ctx,
            CancellationToken::new(),
        );
        ProcessLike::start(Arc::clone(&p), "test", false).await;
        assert_eq!(p.status().state, ProcessState::Finished);
    }

    #[tokio::test]
    async fn test_unknown_worker_reference_errors() {
        let (p, _bus) = proc_with(ProcessConfig::new("lost").with_worker("nobody"));
        ProcessLike::start(Arc::clone(&p), "test", false).await;
        assert_eq!(p.status().state, ProcessState::Errored);
    }

    #[tokio::test]
    async fn test_status_events_preserve_transition_order() {
        let (p, bus) = proc_with(ProcessConfig::new("ordered").with_cmd(["true"]));
        let mut rx = bus.subscribe();
        ProcessLike::start(Arc::clone(&p), "test", false).await;

        let mut states = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if ev.is_status_of("ordered") {
                states.push(ev.status.expect("status set"));
            }
        }
        assert_eq!(
            states,
            vec![
                ProcessState::Starting,
                ProcessState::Running,
                ProcessState::Finished
            ]
        );
    }
}
