//! End-to-end control channel and status persistence.

use std::sync::Arc;
use std::time::Duration;

use pup::{
    ProcessConfig, ProcessState, StatusFile, Supervisor, SupervisorConfig, send_control,
};

fn quick_cfg() -> SupervisorConfig {
    SupervisorConfig {
        terminate_grace: Duration::from_millis(100),
        status_throttle: Duration::from_millis(100),
        heartbeat_interval: Duration::from_millis(500),
        ..SupervisorConfig::default()
    }
}

#[tokio::test]
async fn verbs_round_trip_with_response_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ipc_path = dir.path().join("control.json");
    let status_path = dir.path().join("status.json");

    let sup = Arc::new(
        Supervisor::builder(quick_cfg())
            .with_process(
                ProcessConfig::new("web")
                    .with_cmd(["sleep", "30"])
                    .with_autostart(true),
            )
            .with_ipc_path(&ipc_path)
            .with_status_path(&status_path)
            .build()
            .expect("builds"),
    );

    let runner = Arc::clone(&sup);
    let run_handle = tokio::spawn(async move { runner.run().await });

    // Wait for the unit to come up.
    let unit = sup.unit("web").expect("registered");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while unit.status().state != ProcessState::Running {
        assert!(tokio::time::Instant::now() < deadline, "web never ran");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // Stop over the file channel; the responder answers per-request.
    let success = send_control(&ipc_path, "stop", Some("web"))
        .await
        .expect("response before timeout");
    assert!(success);
    assert_eq!(unit.status().state, ProcessState::Finished);

    // Unknown targets answer success=false instead of timing out.
    let success = send_control(&ipc_path, "restart", Some("nope"))
        .await
        .expect("response before timeout");
    assert!(!success);

    // Block/unblock flip the orthogonal flag without touching the state.
    assert!(send_control(&ipc_path, "block", Some("web")).await.expect("response"));
    let st = unit.status();
    assert!(st.blocked);
    assert_eq!(st.state, ProcessState::Finished);
    assert!(send_control(&ipc_path, "unblock", Some("web")).await.expect("response"));
    assert!(!unit.status().blocked);

    // The status file is readable without contacting the supervisor.
    tokio::time::sleep(Duration::from_millis(700)).await;
    let snapshot = StatusFile::load(&status_path).expect("status file parses");
    assert_eq!(snapshot.pid, std::process::id());
    assert_eq!(snapshot.registry["web"].state, ProcessState::Finished);

    // Terminate shuts the supervisor down through the same channel.
    let success = send_control(&ipc_path, "terminate", None)
        .await
        .expect("response before timeout");
    assert!(success);
    tokio::time::timeout(Duration::from_secs(5), run_handle)
        .await
        .expect("run returns after terminate")
        .expect("join")
        .expect("clean shutdown");
}

#[tokio::test]
async fn requester_times_out_without_a_supervisor() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ipc_path = dir.path().join("nobody-home.json");

    let started = tokio::time::Instant::now();
    let err = send_control(&ipc_path, "start", Some("web")).await.unwrap_err();
    assert_eq!(err.as_label(), "ipc_response_timeout");
    assert!(started.elapsed() >= Duration::from_secs(10));
}
