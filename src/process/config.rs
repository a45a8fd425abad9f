//! # Declarative process definitions.
//!
//! A [`ProcessConfig`] describes one logical unit: what to run (command
//! vector or worker reference), where and with what environment, and the
//! policies governing its lifecycle (autostart, cron patterns, watch set,
//! restart policy/limit, overrun). A config with a
//! [`ClusterConfig`] section fans out into N instances behind an optional
//! load balancer.
//!
//! Configs are validated once at supervisor startup; an inconsistent
//! config aborts startup entirely (unlike per-feature setup errors, which
//! are contained).

use std::collections::HashMap;
use std::path::PathBuf;

use crate::balancer::Strategy;
use crate::error::RuntimeError;
use crate::policies::{BackoffPolicy, RestartPolicy};
use crate::triggers::WatchConfig;

/// Environment variable carrying the process id into spawned units.
pub const ENV_PROCESS_ID: &str = "PUP_PROCESS_ID";
/// Environment variable carrying the 1-based cluster member number.
pub const ENV_CLUSTER_INSTANCE: &str = "PUP_CLUSTER_INSTANCE";
/// Environment variable carrying the cluster member's assigned port.
pub const ENV_CLUSTER_PORT: &str = "PUP_CLUSTER_PORT";
/// Environment variable pointing at per-process scratch storage.
pub const ENV_TEMP_STORAGE: &str = "PUP_TEMP_STORAGE";
/// Environment variable pointing at per-process persistent storage.
pub const ENV_DATA_STORAGE: &str = "PUP_DATA_STORAGE";

/// Declarative definition of one supervised process.
#[derive(Clone, Debug)]
pub struct ProcessConfig {
    /// Unique identifier within the supervisor.
    pub id: String,
    /// Command vector (program + args). Empty when `worker` is set.
    pub cmd: Vec<String>,
    /// Name of a registered worker factory, instead of a command.
    pub worker: Option<String>,
    /// Working directory for spawned commands.
    pub cwd: Option<PathBuf>,
    /// Environment overrides applied on top of the inherited environment.
    pub env: HashMap<String, String>,
    /// Start once at supervisor startup.
    pub autostart: bool,
    /// Cron pattern scheduling repeated starts.
    pub cron: Option<String>,
    /// Cron pattern scheduling repeated stops.
    pub terminate_cron: Option<String>,
    /// Watched path set; a modify batch requests a restart.
    pub watch: Option<WatchConfig>,
    /// When the restart-policy loop re-enters `start`.
    pub restart: RestartPolicy,
    /// Delay between automatic re-entries.
    pub backoff: BackoffPolicy,
    /// Restarts allowed before the process is exhausted; `None` = unlimited.
    pub restart_limit: Option<u32>,
    /// Allow `start` while a previous instance is still running.
    pub overrun: bool,
    /// Write the child pid here while it runs.
    pub pid_file: Option<PathBuf>,
    /// Fan this definition out into a cluster.
    pub cluster: Option<ClusterConfig>,
}

/// Cluster section of a process definition.
#[derive(Clone, Debug)]
pub struct ClusterConfig {
    /// Number of member instances.
    pub instances: u32,
    /// First member port; member `i` (1-based) gets `start_port + i - 1`.
    pub start_port: u16,
    /// Port the shared load balancer listens on, when configured.
    pub common_port: Option<u16>,
    /// Balancing strategy for the shared load balancer.
    pub strategy: Strategy,
}

impl ProcessConfig {
    /// Creates a definition with defaults: no command, no triggers, no
    /// autostart, `RestartPolicy::Never`, default backoff, no limit,
    /// overrun disallowed.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cmd: Vec::new(),
            worker: None,
            cwd: None,
            env: HashMap::new(),
            autostart: false,
            cron: None,
            terminate_cron: None,
            watch: None,
            restart: RestartPolicy::Never,
            backoff: BackoffPolicy::default(),
            restart_limit: None,
            overrun: false,
            pid_file: None,
            cluster: None,
        }
    }

    /// Creates a definition inheriting the restart and backoff defaults of
    /// the global config.
    pub fn with_defaults(id: impl Into<String>, cfg: &crate::config::SupervisorConfig) -> Self {
        Self {
            restart: cfg.restart,
            backoff: cfg.backoff,
            ..Self::new(id)
        }
    }

    /// Sets the command vector.
    pub fn with_cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = cmd.into_iter().map(Into::into).collect();
        self
    }

    /// References a registered worker factory instead of a command.
    pub fn with_worker(mut self, name: impl Into<String>) -> Self {
        self.worker = Some(name.into());
        self
    }

    /// Sets the working directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Adds one environment override.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Enables start at supervisor startup.
    pub fn with_autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }

    /// Schedules repeated starts on a cron pattern.
    pub fn with_cron(mut self, pattern: impl Into<String>) -> Self {
        self.cron = Some(pattern.into());
        self
    }

    /// Schedules repeated stops on a cron pattern.
    pub fn with_terminate_cron(mut self, pattern: impl Into<String>) -> Self {
        self.terminate_cron = Some(pattern.into());
        self
    }

    /// Restarts when any of these paths sees a modify event.
    pub fn with_watch(mut self, watch: WatchConfig) -> Self {
        self.watch = Some(watch);
        self
    }

    /// Sets the restart policy.
    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    /// Sets the restart-delay policy.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Caps automatic restarts.
    pub fn with_restart_limit(mut self, limit: u32) -> Self {
        self.restart_limit = Some(limit);
        self
    }

    /// Allows `start` while a previous instance is still running.
    pub fn with_overrun(mut self, overrun: bool) -> Self {
        self.overrun = overrun;
        self
    }

    /// Writes the child pid to this file while it runs.
    pub fn with_pid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pid_file = Some(path.into());
        self
    }

    /// Fans this definition out into a cluster.
    pub fn with_cluster(mut self, cluster: ClusterConfig) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Checks internal consistency; failures abort supervisor startup.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.id.trim().is_empty() {
            return Err(RuntimeError::Config {
                reason: "process id must not be empty".into(),
            });
        }
        match (&self.worker, self.cmd.is_empty()) {
            (None, true) => {
                return Err(RuntimeError::Config {
                    reason: format!("process {:?} declares neither command nor worker", self.id),
                })
            }
            (Some(_), false) => {
                return Err(RuntimeError::Config {
                    reason: format!("process {:?} declares both command and worker", self.id),
                })
            }
            _ => {}
        }
        if let Some(cluster) = &self.cluster {
            if cluster.instances == 0 {
                return Err(RuntimeError::Config {
                    reason: format!("cluster {:?} declares zero instances", self.id),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_command_config() {
        let cfg = ProcessConfig::new("web").with_cmd(["sleep", "1"]);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_empty_id_rejected() {
        let cfg = ProcessConfig::new("  ").with_cmd(["true"]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_neither_cmd_nor_worker_rejected() {
        let err = ProcessConfig::new("idle").validate().unwrap_err();
        assert_eq!(err.as_label(), "runtime_config_invalid");
    }

    #[test]
    fn test_both_cmd_and_worker_rejected() {
        let cfg = ProcessConfig::new("both")
            .with_cmd(["true"])
            .with_worker("tick");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_cluster_instances_rejected() {
        let cfg = ProcessConfig::new("pool").with_cmd(["true"]).with_cluster(ClusterConfig {
            instances: 0,
            start_port: 9000,
            common_port: None,
            strategy: Default::default(),
        });
        assert!(cfg.validate().is_err());
    }
}
