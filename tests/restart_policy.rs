//! End-to-end restart behavior through the supervisor's policy loop.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pup::{
    BackoffPolicy, EventKind, ProcessConfig, ProcessError, ProcessState, RestartPolicy,
    Supervisor, SupervisorConfig, WorkerFn,
};

/// Worker that fails its first three attempts, then runs until cancelled.
fn flaky_then_steady() -> (Arc<AtomicU32>, Arc<dyn pup::WorkerFactory>) {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let factory = WorkerFn::arc(move |ctx| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if n <= 3 {
                Err(ProcessError::Worker {
                    error: format!("induced failure #{n}"),
                })
            } else {
                ctx.cancelled().await;
                Ok(0)
            }
        }
    });
    (attempts, factory)
}

#[tokio::test]
async fn three_failures_restart_with_spacing_then_stop_resets_counter() {
    let delay = Duration::from_millis(100);
    let (attempts, factory) = flaky_then_steady();

    // Short terminate grace so the cancellable worker stops promptly.
    let cfg = SupervisorConfig {
        terminate_grace: Duration::from_millis(100),
        ..SupervisorConfig::default()
    };
    let sup = Arc::new(
        Supervisor::builder(cfg)
            .with_worker("flaky", factory)
            .with_process(
                ProcessConfig::new("unit")
                    .with_worker("flaky")
                    .with_autostart(true)
                    .with_restart(RestartPolicy::Always)
                    .with_backoff(BackoffPolicy::fixed(delay)),
            )
            .build()
            .expect("builds"),
    );

    let mut rx = sup.bus().subscribe();
    let runner = Arc::clone(&sup);
    let run_handle = tokio::spawn(async move { runner.run().await });

    // Wait until the worker survived its fourth attempt.
    let unit = sup.unit("unit").expect("registered");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let st = unit.status();
        if st.state == ProcessState::Running && st.restarts == 3 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "never reached steady state; status = {:?}",
            st
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 4, "initial + three restarts");

    // Three restart attempts, spaced at least the configured delay apart.
    let mut starting_times = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        if ev.kind == EventKind::ProcessStatusChanged
            && ev.status == Some(ProcessState::Starting)
        {
            starting_times.push(ev.at);
        }
    }
    assert_eq!(starting_times.len(), 4, "one initial start, three re-entries");
    for pair in starting_times.windows(2) {
        let gap = pair[1]
            .duration_since(pair[0])
            .expect("monotonic enough for this test");
        assert!(
            gap >= delay - Duration::from_millis(10),
            "restart gap {gap:?} under the configured delay"
        );
    }

    // A manual stop resolves once actually stopped and clears the budget.
    assert!(unit.stop("operator").await);
    let st = unit.status();
    assert_eq!(st.state, ProcessState::Finished);
    assert_eq!(st.restarts, 0);

    sup.request_shutdown();
    run_handle.await.expect("join").expect("clean shutdown");
}

#[tokio::test]
async fn on_error_policy_ignores_clean_exits() {
    let sup = Arc::new(
        Supervisor::builder(SupervisorConfig::default())
            .with_process(
                ProcessConfig::new("oneshot")
                    .with_cmd(["true"])
                    .with_autostart(true)
                    .with_restart(RestartPolicy::OnError)
                    .with_backoff(BackoffPolicy::fixed(Duration::from_millis(50))),
            )
            .build()
            .expect("builds"),
    );

    let runner = Arc::clone(&sup);
    let run_handle = tokio::spawn(async move { runner.run().await });

    let unit = sup.unit("oneshot").expect("registered");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while unit.status().state != ProcessState::Finished {
        assert!(tokio::time::Instant::now() < deadline, "never finished");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // Give the policy loop room to (wrongly) schedule a re-entry.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let st = unit.status();
    assert_eq!(st.state, ProcessState::Finished, "clean exit stays finished");
    assert_eq!(st.restarts, 0);

    sup.request_shutdown();
    run_handle.await.expect("join").expect("clean shutdown");
}
