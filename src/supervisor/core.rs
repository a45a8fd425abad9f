//! # Supervisor: owns the units, the bus, and the policy loops.
//!
//! The [`Supervisor`] is built once from validated configuration via
//! [`SupervisorBuilder`] and runs until an OS signal or a `terminate`
//! control verb asks it to stop.
//!
//! ```text
//! SupervisorBuilder { configs, workers, subscribers, paths }
//!        │ build()  (validation failures abort startup)
//!        ▼
//! Supervisor
//!   ├── units: id → ProcessLike   (roots + cluster members, flat)
//!   ├── Bus ──► subscriber listener ──► SubscriberSet
//!   ├── restart-policy listener   (pending marker + RestartPolicy)
//!   ├── status writer             (throttled heartbeat file)
//!   └── control responder         (file IPC verbs)
//!
//! run():
//!   init roots → autostart → wait for signal/terminate
//!     → ShutdownRequested → cancel triggers → stop roots within grace
//!     → AllStoppedWithin | GraceExceeded (+ stuck ids)
//! ```
//!
//! ## The restart-policy loop
//! The per-process state machine never restarts anything by itself. This
//! loop watches terminal status events and re-enters `start` when either
//! - the unit carries a pending-restart marker (`restart` verb, watch
//!   trigger), which bypasses the policy, or
//! - the configured [`RestartPolicy`](crate::policies::RestartPolicy)
//!   says so (`Always`, or `OnError` after an errored attempt),
//!
//! waiting `backoff.next(restarts)` first. Crashed and changed-on-disk
//! processes re-enter through this same path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::SupervisorConfig;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::ipc::FileIpc;
use crate::process::{
    Cluster, Process, ProcessConfig, ProcessLike, ProcessState, SpawnContext,
};
use crate::runner::{WorkerFactory, WorkerRegistry};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::supervisor::control::spawn_control_loop;
use crate::supervisor::shutdown::wait_for_shutdown_signal;
use crate::supervisor::status::spawn_status_writer;

/// Builder for a configured supervisor.
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    workers: WorkerRegistry,
    configs: Vec<ProcessConfig>,
    ipc_path: Option<PathBuf>,
    status_path: Option<PathBuf>,
}

impl SupervisorBuilder {
    /// Creates a builder with the given global configuration.
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            workers: WorkerRegistry::default(),
            configs: Vec::new(),
            ipc_path: None,
            status_path: None,
        }
    }

    /// Registers an event subscriber.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Registers a worker factory under `name`.
    pub fn with_worker(mut self, name: impl Into<String>, factory: Arc<dyn WorkerFactory>) -> Self {
        self.workers.register(name, factory);
        self
    }

    /// Adds one process definition.
    pub fn with_process(mut self, config: ProcessConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Enables the file-based control channel on `path`.
    pub fn with_ipc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ipc_path = Some(path.into());
        self
    }

    /// Enables status persistence to `path`.
    pub fn with_status_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.status_path = Some(path.into());
        self
    }

    /// Validates the declared configuration and assembles the supervisor.
    ///
    /// Unlike per-feature setup errors (bad cron pattern, unwatchable
    /// path), an inconsistent declaration aborts startup entirely.
    pub fn build(self) -> Result<Supervisor, RuntimeError> {
        let bus = Bus::new(self.cfg.bus_capacity.max(1));
        let token = CancellationToken::new();
        let ctx = SpawnContext::from_config(&self.cfg, self.workers);

        let mut units: HashMap<String, Arc<dyn ProcessLike>> = HashMap::new();
        let mut roots: Vec<Arc<dyn ProcessLike>> = Vec::new();

        for config in self.configs {
            config.validate()?;
            if units.contains_key(&config.id) {
                return Err(RuntimeError::Config {
                    reason: format!("duplicate process id {:?}", config.id),
                });
            }

            if config.cluster.is_some() {
                let cluster = Cluster::new(
                    config,
                    bus.clone(),
                    Arc::clone(&ctx),
                    token.child_token(),
                );
                for member in cluster.members() {
                    if units.contains_key(member.id()) {
                        return Err(RuntimeError::Config {
                            reason: format!("duplicate process id {:?}", member.id()),
                        });
                    }
                    units.insert(member.id().to_string(), Arc::clone(member) as _);
                }
                units.insert(cluster.id().to_string(), Arc::clone(&cluster) as _);
                roots.push(cluster);
            } else {
                let process = Process::new(
                    config,
                    bus.clone(),
                    Arc::clone(&ctx),
                    token.child_token(),
                );
                units.insert(process.id().to_string(), Arc::clone(&process) as _);
                roots.push(process);
            }
        }

        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));

        Ok(Supervisor {
            cfg: self.cfg,
            bus,
            subs,
            units: Arc::new(units),
            roots,
            token,
            shutdown_requested: CancellationToken::new(),
            ipc_path: self.ipc_path,
            status_path: self.status_path,
        })
    }
}

/// Orchestrates the full set of processes and clusters.
pub struct Supervisor {
    cfg: SupervisorConfig,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    units: Arc<HashMap<String, Arc<dyn ProcessLike>>>,
    roots: Vec<Arc<dyn ProcessLike>>,
    token: CancellationToken,
    shutdown_requested: CancellationToken,
    ipc_path: Option<PathBuf>,
    status_path: Option<PathBuf>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("units", &self.units.keys().collect::<Vec<_>>())
            .field("roots", &self.roots.len())
            .field("ipc_path", &self.ipc_path)
            .field("status_path", &self.status_path)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Starts building a supervisor.
    pub fn builder(cfg: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    /// The event bus (for tests and embedding).
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Looks a unit up by id (cluster members included).
    pub fn unit(&self, id: &str) -> Option<Arc<dyn ProcessLike>> {
        self.units.get(id).cloned()
    }

    /// Sorted ids of every managed unit.
    pub fn unit_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.units.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Asks a running supervisor to shut down (same path as `terminate`).
    pub fn request_shutdown(&self) {
        self.shutdown_requested.cancel();
    }

    /// Runs until an OS signal or a terminate request, then stops
    /// everything within the configured grace.
    pub async fn run(&self) -> Result<(), RuntimeError> {
        self.subscriber_listener();
        self.restart_listener();

        if let Some(path) = &self.status_path {
            spawn_status_writer(
                path.clone(),
                self.bus.clone(),
                Arc::clone(&self.units),
                self.cfg.status_throttle,
                self.cfg.heartbeat_interval,
                self.token.child_token(),
            );
        }
        let ipc = self.ipc_path.as_ref().map(|path| {
            FileIpc::new(path)
                .with_staleness(self.cfg.ipc_staleness)
                .with_max_payload(self.cfg.ipc_max_payload)
        });
        if let Some(ipc) = &ipc {
            spawn_control_loop(
                ipc.clone(),
                Arc::clone(&self.units),
                self.roots.clone(),
                self.bus.clone(),
                self.shutdown_requested.clone(),
                self.token.child_token(),
            );
        }

        join_all(self.roots.iter().map(|r| Arc::clone(r).init())).await;

        for root in &self.roots {
            if root.config().autostart {
                tokio::spawn(Arc::clone(root).start("autostart", false));
            }
        }
        info!(units = self.units.len(), "supervisor running");

        tokio::select! {
            sig = wait_for_shutdown_signal() => {
                if let Err(e) = sig {
                    error!("signal listener failed: {e}");
                }
            }
            _ = self.shutdown_requested.cancelled() => {}
        }

        self.bus.publish(Event::now(EventKind::ShutdownRequested));
        // Tear triggers and loops down first so nothing restarts what we
        // are about to stop.
        self.token.cancel();
        let result = self.stop_all().await;

        if let Some(ipc) = &ipc {
            ipc.close().await;
        }
        result
    }

    /// Forwards bus events to the subscriber fan-out.
    fn subscriber_listener(&self) {
        let mut rx = self.bus.subscribe();
        let subs = Arc::clone(&self.subs);
        let token = self.token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    ev = rx.recv() => match ev {
                        Ok(ev) => subs.emit_arc(Arc::new(ev)),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "subscriber listener lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
    }

    /// Watches terminal status events and applies restart policy.
    fn restart_listener(&self) {
        let mut rx = self.bus.subscribe();
        let units = Arc::clone(&self.units);
        let bus = self.bus.clone();
        let token = self.token.clone();

        tokio::spawn(async move {
            loop {
                let ev = tokio::select! {
                    _ = token.cancelled() => break,
                    ev = rx.recv() => match ev {
                        Ok(ev) => ev,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "restart listener lagged");
                            continue;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                };

                if ev.kind != EventKind::ProcessStatusChanged {
                    continue;
                }
                let ended = matches!(
                    ev.status,
                    Some(ProcessState::Finished) | Some(ProcessState::Errored)
                );
                if !ended {
                    continue;
                }
                let Some(id) = ev.process.as_deref() else {
                    continue;
                };
                let Some(unit) = units.get(id) else { continue };

                let errored = ev.status == Some(ProcessState::Errored);
                let reason = match unit.take_pending_restart() {
                    Some(reason) => reason,
                    None if unit.config().restart.should_restart(errored) => {
                        "restart policy".to_string()
                    }
                    None => continue,
                };

                let delay = unit.config().backoff.next(unit.status().restarts);
                bus.publish(
                    Event::now(EventKind::ProcessScheduled)
                        .with_process(id)
                        .with_reason(reason.as_str())
                        .with_delay(delay),
                );

                let unit = Arc::clone(unit);
                let token = token.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {
                            unit.start(&reason, true).await;
                        }
                    }
                });
            }
        });
    }

    /// Stops every root within the grace window.
    async fn stop_all(&self) -> Result<(), RuntimeError> {
        let stopping = join_all(self.roots.iter().map(|r| r.stop("shutdown")));

        match tokio::time::timeout(self.cfg.grace, stopping).await {
            Ok(_) => {
                self.bus.publish(Event::now(EventKind::AllStoppedWithin));
                info!("all processes stopped within grace");
                Ok(())
            }
            Err(_) => {
                self.bus.publish(Event::now(EventKind::GraceExceeded));
                let stuck: Vec<String> = self
                    .units
                    .iter()
                    .filter(|(_, u)| !u.status().state.is_terminal())
                    .map(|(id, _)| id.clone())
                    .collect();
                error!(?stuck, "grace exceeded");
                Err(RuntimeError::GraceExceeded {
                    grace: self.cfg.grace,
                    stuck,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_ids_abort_startup() {
        let err = Supervisor::builder(SupervisorConfig::default())
            .with_process(ProcessConfig::new("web").with_cmd(["true"]))
            .with_process(ProcessConfig::new("web").with_cmd(["false"]))
            .build()
            .unwrap_err();
        assert_eq!(err.as_label(), "runtime_config_invalid");
    }

    #[test]
    fn test_invalid_process_config_aborts_startup() {
        let err = Supervisor::builder(SupervisorConfig::default())
            .with_process(ProcessConfig::new("empty"))
            .build()
            .unwrap_err();
        assert_eq!(err.as_label(), "runtime_config_invalid");
    }

    #[tokio::test]
    async fn test_cluster_members_are_addressable_units() {
        let sup = Supervisor::builder(SupervisorConfig::default())
            .with_process(
                ProcessConfig::new("pool")
                    .with_cmd(["true"])
                    .with_cluster(crate::process::ClusterConfig {
                        instances: 2,
                        start_port: 9500,
                        common_port: None,
                        strategy: Default::default(),
                    }),
            )
            .build()
            .expect("builds");
        assert_eq!(sup.unit_ids(), vec!["pool", "pool-1", "pool-2"]);
        assert!(sup.unit("pool-2").is_some());
    }
}
