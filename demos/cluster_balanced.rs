//! Three HTTP servers behind the built-in round-robin balancer.
//!
//! Run with: `cargo run --example cluster_balanced`, then hit
//! `http://127.0.0.1:8000/` — connections rotate across members
//! listening on 8001..8003 (each serves on its `PUP_CLUSTER_PORT`).

use std::sync::Arc;

use pup::{
    ClusterConfig, LogWriter, ProcessConfig, RestartPolicy, Strategy, Supervisor,
    SupervisorConfig,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    let sup = Supervisor::builder(SupervisorConfig::default())
        .with_subscriber(Arc::new(LogWriter::new()))
        .with_process(
            ProcessConfig::new("httpd")
                .with_cmd(["sh", "-c", "python3 -m http.server \"$PUP_CLUSTER_PORT\""])
                .with_autostart(true)
                .with_restart(RestartPolicy::Always)
                .with_cluster(ClusterConfig {
                    instances: 3,
                    start_port: 8001,
                    common_port: Some(8000),
                    strategy: Strategy::RoundRobin,
                }),
        )
        .build()?;

    sup.run().await?;
    Ok(())
}
