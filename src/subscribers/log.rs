//! # LogWriter — renders runtime events through the logger.
//!
//! The built-in subscriber that turns every bus event into a severity
//! tagged `tracing` line. Operational failures (errored processes, grace
//! exceeded, subscriber trouble) log at warn/error; ordinary lifecycle at
//! info.

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::events::{Event, EventKind};
use crate::process::ProcessState;
use crate::subscribers::subscribe::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Constructs a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let process = e.process.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::ProcessStatusChanged => match e.status {
                Some(ProcessState::Errored) => {
                    warn!(process, reason, code = ?e.code, "errored")
                }
                Some(state) => {
                    info!(process, reason, state = ?state, pid = ?e.pid, "status")
                }
                None => info!(process, reason, "status"),
            },
            EventKind::ProcessScheduled => {
                info!(process, reason, delay_ms = ?e.delay_ms, "scheduled")
            }
            EventKind::WatchTriggered => info!(process, path = reason, "watch triggered"),
            EventKind::IpcReceived => info!(pid = ?e.pid, payload = reason, "ipc received"),
            EventKind::ShutdownRequested => info!("shutdown requested"),
            EventKind::AllStoppedWithin => info!("all processes stopped within grace"),
            EventKind::GraceExceeded => error!("grace exceeded"),
            EventKind::SubscriberOverflow => {
                warn!(subscriber = process, reason, "subscriber overflow")
            }
            EventKind::SubscriberPanicked => {
                error!(subscriber = process, info = reason, "subscriber panicked")
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
