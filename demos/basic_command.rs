//! Supervise one crash-prone command with an always-restart policy.
//!
//! Run with: `cargo run --example basic_command`

use std::sync::Arc;
use std::time::Duration;

use pup::{
    BackoffPolicy, LogWriter, ProcessConfig, RestartPolicy, Supervisor, SupervisorConfig,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .init();

    let sup = Supervisor::builder(SupervisorConfig::default())
        .with_subscriber(Arc::new(LogWriter::new()))
        .with_process(
            ProcessConfig::new("date-loop")
                .with_cmd(["sh", "-c", "date; sleep 2"])
                .with_autostart(true)
                .with_restart(RestartPolicy::Always)
                .with_backoff(BackoffPolicy::fixed(Duration::from_millis(500))),
        )
        .with_ipc_path("/tmp/pup-demo/control.json")
        .with_status_path("/tmp/pup-demo/status.json")
        .build()?;

    // Ctrl-C stops the loop and the supervised command.
    sup.run().await?;
    Ok(())
}
