//! # Heartbeat and status persistence.
//!
//! The supervisor periodically serializes `{pid, heartbeat, taskRegistry}`
//! to the status file, where `taskRegistry` maps process id → last known
//! status snapshot. External `status`-style tooling reads this file
//! without contacting the live supervisor.
//!
//! Writes are throttled: however many status events arrive, at least
//! `throttle` separates two writes, and a heartbeat write happens every
//! `heartbeat` interval regardless of activity. The file is written to a
//! temp sibling and renamed into place.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::events::{Bus, EventKind};
use crate::process::{ProcessLike, ProcessStatus};

/// On-disk shape of the status file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusFile {
    /// Pid of the supervisor that wrote the snapshot.
    pub pid: u32,
    /// When the snapshot was written.
    pub heartbeat: DateTime<Utc>,
    /// Last known status per process id (cluster members included).
    #[serde(rename = "taskRegistry")]
    pub registry: BTreeMap<String, ProcessStatus>,
}

impl StatusFile {
    /// Parses a previously written status file.
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// Spawns the status-writer loop.
pub(crate) fn spawn_status_writer(
    path: PathBuf,
    bus: Bus,
    units: Arc<HashMap<String, Arc<dyn ProcessLike>>>,
    throttle: Duration,
    heartbeat: Duration,
    token: CancellationToken,
) {
    let mut rx = bus.subscribe();

    tokio::spawn(async move {
        let mut beat = tokio::time::interval(heartbeat);
        beat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut dirty = true;
        let mut last_write = Instant::now() - throttle;

        loop {
            // Flush as soon as the throttle window allows it.
            let flush_at = last_write + throttle;
            tokio::select! {
                _ = token.cancelled() => break,
                _ = beat.tick() => dirty = true,
                _ = tokio::time::sleep_until(flush_at), if dirty => {}
                ev = rx.recv() => {
                    if let Ok(ev) = ev {
                        if ev.kind == EventKind::ProcessStatusChanged {
                            dirty = true;
                        }
                    }
                    continue;
                }
            }

            if dirty && last_write.elapsed() >= throttle {
                write_snapshot(&path, &units).await;
                dirty = false;
                last_write = Instant::now();
            }
        }

        // Final snapshot so the file reflects the shutdown outcome.
        write_snapshot(&path, &units).await;
    });
}

async fn write_snapshot(path: &Path, units: &HashMap<String, Arc<dyn ProcessLike>>) {
    let snapshot = StatusFile {
        pid: std::process::id(),
        heartbeat: Utc::now(),
        registry: units
            .iter()
            .map(|(id, unit)| (id.clone(), unit.status()))
            .collect(),
    };
    let text = match serde_json::to_string_pretty(&snapshot) {
        Ok(text) => text,
        Err(e) => {
            warn!("status serialize failed: {e}");
            return;
        }
    };

    let tmp = path.with_extension("tmp");
    let result = async {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&tmp, &text).await?;
        tokio::fs::rename(&tmp, path).await
    }
    .await;
    match result {
        Ok(()) => debug!(path = %path.display(), "status written"),
        Err(e) => warn!(path = %path.display(), "status write failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessState;

    #[test]
    fn test_status_file_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("status.json");

        let mut registry = BTreeMap::new();
        let mut st = ProcessStatus::default();
        st.state = ProcessState::Running;
        st.pid = Some(77);
        registry.insert("web".to_string(), st);

        let snapshot = StatusFile {
            pid: 1,
            heartbeat: Utc::now(),
            registry,
        };
        std::fs::write(&path, serde_json::to_string(&snapshot).expect("json")).expect("write");

        let loaded = StatusFile::load(&path).expect("load");
        assert_eq!(loaded.pid, 1);
        let web = &loaded.registry["web"];
        assert_eq!(web.state, ProcessState::Running);
        assert_eq!(web.pid, Some(77));
    }

    #[test]
    fn test_wire_uses_task_registry_key() {
        let snapshot = StatusFile {
            pid: 1,
            heartbeat: Utc::now(),
            registry: BTreeMap::new(),
        };
        let text = serde_json::to_string(&snapshot).expect("json");
        assert!(text.contains("\"taskRegistry\""));
    }
}
