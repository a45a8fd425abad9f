//! # Cluster: one definition fanned out into N member processes.
//!
//! A [`Cluster`] deep-copies its base config once per member, gives each
//! copy a suffixed id (`web-1`, `web-2`, ...) and a distinct
//! `PUP_CLUSTER_INSTANCE` / `PUP_CLUSTER_PORT` pair, and exposes the same
//! [`ProcessLike`] surface as a plain process by fanning every operation
//! out to all members in parallel.
//!
//! With a common port configured the cluster additionally owns a
//! [`LoadBalancer`] seeded with one backend per member port, started on
//! [`init`](ProcessLike::init).
//!
//! ## Aggregation rules
//! - `stop` is true only when **every** member stopped (logical AND).
//! - status: all blocked → `Blocked`; all running → `Running`;
//!   some running → `Starting`; otherwise `Created`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::balancer::{Backend, LoadBalancer};
use crate::events::Bus;
use crate::process::config::{
    ClusterConfig, ProcessConfig, ENV_CLUSTER_INSTANCE, ENV_CLUSTER_PORT,
};
use crate::process::context::SpawnContext;
use crate::process::core::Process;
use crate::process::like::ProcessLike;
use crate::process::state::{ProcessState, ProcessStatus};

/// N member processes behind one logical id.
pub struct Cluster {
    config: ProcessConfig,
    section: ClusterConfig,
    members: Vec<Arc<Process>>,
    balancer: Option<Arc<LoadBalancer>>,
    token: CancellationToken,
}

impl Cluster {
    /// Builds the members (and balancer, when a common port is set) from a
    /// definition carrying a cluster section.
    pub fn new(
        config: ProcessConfig,
        bus: Bus,
        ctx: Arc<SpawnContext>,
        token: CancellationToken,
    ) -> Arc<Self> {
        let section = config.cluster.clone().unwrap_or(ClusterConfig {
            instances: 1,
            start_port: 0,
            common_port: None,
            strategy: Default::default(),
        });

        let mut members = Vec::with_capacity(section.instances as usize);
        for i in 1..=section.instances {
            let port = section.start_port + (i as u16) - 1;

            let mut member_cfg = config.clone();
            member_cfg.id = format!("{}-{}", config.id, i);
            member_cfg.cluster = None;
            if let Some(pid_file) = member_cfg.pid_file.take() {
                let mut named = pid_file.into_os_string();
                named.push(format!("-{i}"));
                member_cfg.pid_file = Some(named.into());
            }

            let mut env_extra = HashMap::new();
            env_extra.insert(ENV_CLUSTER_INSTANCE.to_string(), i.to_string());
            env_extra.insert(ENV_CLUSTER_PORT.to_string(), port.to_string());

            members.push(Process::with_extra_env(
                member_cfg,
                bus.clone(),
                Arc::clone(&ctx),
                token.child_token(),
                env_extra,
            ));
        }

        let balancer = section.common_port.map(|_| {
            let backends = members
                .iter()
                .enumerate()
                .map(|(i, _)| Backend::new("127.0.0.1", section.start_port + i as u16))
                .collect();
            Arc::new(LoadBalancer::new(backends, section.strategy))
        });

        Arc::new(Self {
            config,
            section,
            members,
            balancer,
            token,
        })
    }

    /// The member processes, in instance order.
    pub fn members(&self) -> &[Arc<Process>] {
        &self.members
    }

    /// The shared balancer, when a common port is configured.
    pub fn balancer(&self) -> Option<&Arc<LoadBalancer>> {
        self.balancer.as_ref()
    }
}

#[async_trait]
impl ProcessLike for Cluster {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn config(&self) -> &ProcessConfig {
        &self.config
    }

    fn status(&self) -> ProcessStatus {
        let statuses: Vec<ProcessStatus> = self.members.iter().map(|m| m.status()).collect();

        let all_blocked = !statuses.is_empty() && statuses.iter().all(|s| s.blocked);
        let running = statuses
            .iter()
            .filter(|s| s.state == ProcessState::Running)
            .count();

        let state = if all_blocked {
            ProcessState::Blocked
        } else if running == statuses.len() && running > 0 {
            ProcessState::Running
        } else if running > 0 {
            ProcessState::Starting
        } else {
            ProcessState::Created
        };

        ProcessStatus {
            state,
            blocked: all_blocked,
            restarts: statuses.iter().map(|s| s.restarts).sum(),
            updated_at: Utc::now(),
            ..ProcessStatus::default()
        }
    }

    async fn init(self: Arc<Self>) {
        join_all(
            self.members
                .iter()
                .map(|m| ProcessLike::init(Arc::clone(m))),
        )
        .await;

        if let (Some(balancer), Some(port)) = (self.balancer.clone(), self.section.common_port) {
            let token = self.token.child_token();
            let id = self.config.id.clone();
            tokio::spawn(async move {
                if let Err(e) = balancer.start(port, token).await {
                    error!(cluster = %id, "balancer failed: {e}");
                }
            });
        }
    }

    async fn start(self: Arc<Self>, reason: &str, is_restart: bool) {
        join_all(
            self.members
                .iter()
                .map(|m| ProcessLike::start(Arc::clone(m), reason, is_restart)),
        )
        .await;
    }

    async fn stop(&self, reason: &str) -> bool {
        join_all(self.members.iter().map(|m| m.stop(reason)))
            .await
            .into_iter()
            .all(|stopped| stopped)
    }

    async fn restart(self: Arc<Self>, reason: &str) {
        join_all(
            self.members
                .iter()
                .map(|m| ProcessLike::restart(Arc::clone(m), reason)),
        )
        .await;
    }

    fn block(&self, reason: &str) {
        for member in &self.members {
            member.block(reason);
        }
    }

    fn unblock(&self, reason: &str) {
        for member in &self.members {
            member.unblock(reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::Strategy;

    fn cluster_of(n: u32) -> Arc<Cluster> {
        let config = ProcessConfig::new("pool")
            .with_cmd(["sleep", "30"])
            .with_cluster(ClusterConfig {
                instances: n,
                start_port: 9300,
                common_port: None,
                strategy: Strategy::RoundRobin,
            });
        let ctx = SpawnContext {
            terminate_grace: std::time::Duration::from_millis(100),
            ..SpawnContext::default()
        };
        Cluster::new(config, Bus::new(256), Arc::new(ctx), CancellationToken::new())
    }

    #[test]
    fn test_members_get_suffixed_ids_and_identity_env() {
        let cluster = cluster_of(3);
        let ids: Vec<&str> = cluster.members().iter().map(|m| m.id()).collect();
        assert_eq!(ids, vec!["pool-1", "pool-2", "pool-3"]);
    }

    #[test]
    fn test_balancer_seeded_with_one_backend_per_member() {
        let config = ProcessConfig::new("pool")
            .with_cmd(["true"])
            .with_cluster(ClusterConfig {
                instances: 2,
                start_port: 9400,
                common_port: Some(9399),
                strategy: Strategy::RoundRobin,
            });
        let cluster = Cluster::new(
            config,
            Bus::new(64),
            Arc::new(SpawnContext::default()),
            CancellationToken::new(),
        );
        let balancer = cluster.balancer().expect("common port set");
        let ports: Vec<u16> = balancer.backends().iter().map(|b| b.port()).collect();
        assert_eq!(ports, vec![9400, 9401]);
    }

    #[test]
    fn test_aggregate_status_idle_members_is_created() {
        let cluster = cluster_of(3);
        assert_eq!(cluster.status().state, ProcessState::Created);
    }

    #[tokio::test]
    async fn test_aggregate_status_some_running_is_starting() {
        let cluster = cluster_of(3);
        // Bring up two of three members.
        for member in &cluster.members()[..2] {
            let m = Arc::clone(member);
            tokio::spawn(ProcessLike::start(m, "test", false));
        }
        for _ in 0..100 {
            let running = cluster
                .members()
                .iter()
                .filter(|m| m.status().state == ProcessState::Running)
                .count();
            if running == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(cluster.status().state, ProcessState::Starting);
        cluster.stop("cleanup").await;
    }

    #[test]
    fn test_aggregate_status_all_blocked_is_blocked() {
        let cluster = cluster_of(3);
        cluster.block("maintenance");
        let st = cluster.status();
        assert_eq!(st.state, ProcessState::Blocked);
        assert!(st.blocked);

        cluster.unblock("maintenance");
        assert_eq!(cluster.status().state, ProcessState::Created);
    }

    #[tokio::test]
    async fn test_stop_aggregates_with_logical_and() {
        let cluster = cluster_of(2);
        // Nothing running yet: every member reports false, so the AND does.
        assert!(!cluster.stop("noop").await);
    }
}
