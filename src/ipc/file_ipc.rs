//! # File-backed point-to-point message queue.
//!
//! [`FileIpc`] provides best-effort, at-least-once delivery between OS
//! processes that share a filesystem, with no sockets involved. Writers
//! append to a JSON array in a shared file; the reader claims the whole
//! file, validates each entry, and yields them as batches.
//!
//! ```text
//! writer A ──┐
//! writer B ──┼─► read array → append entry → rewrite file
//!            │
//! reader ────┴─► (watch event | idle poll) → read → REMOVE file → parse
//!                                                     → validate → batch
//! ```
//!
//! ## Known limitation (kept deliberately)
//! Neither side takes a lock. The reader removes the file *before*
//! validating so a batch is claimed at most once, which leaves a narrow
//! window where a writer's read-modify-write races the reader's removal
//! and a message is lost, and where a second concurrent reader sees an
//! empty file. Control commands are idempotent and infrequent, so the
//! protocol stays non-atomic instead of inventing a locking scheme.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::IpcError;
use crate::ipc::message::{wire_entry, IpcMessage};
use crate::triggers::{spawn_watcher, WatchConfig};

/// File-backed message queue endpoint.
///
/// Cheap to clone; clones share the path and settings, not any state.
#[derive(Clone, Debug)]
pub struct FileIpc {
    path: PathBuf,
    staleness: Duration,
    max_payload: usize,
    debounce: Duration,
    poll_interval: Duration,
}

impl FileIpc {
    /// Creates an endpoint on `path` with default limits
    /// (30 s staleness window, 64 KiB payload ceiling, 500 ms idle poll).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            staleness: Duration::from_secs(30),
            max_payload: 64 * 1024,
            debounce: Duration::from_millis(150),
            poll_interval: Duration::from_millis(500),
        }
    }

    /// Overrides the staleness window.
    pub fn with_staleness(mut self, window: Duration) -> Self {
        self.staleness = window;
        self
    }

    /// Overrides the payload size ceiling.
    pub fn with_max_payload(mut self, max: usize) -> Self {
        self.max_payload = max;
        self
    }

    /// Overrides the idle poll interval of the receive loop.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The shared file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `payload` to the shared file.
    ///
    /// Reads the current array (absence and unreadable content both count
    /// as empty), appends `{pid, data, sent}`, rewrites the whole file.
    /// Not transactional across processes; see the module docs.
    pub async fn send(&self, payload: &str) -> Result<(), IpcError> {
        if payload.len() > self.max_payload {
            return Err(IpcError::Oversized {
                len: payload.len(),
                max: self.max_payload,
            });
        }

        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| self.io_err(e))?;
        }

        let mut entries = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => match serde_json::from_str::<Vec<Value>>(&text) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %self.path.display(), "discarding unreadable ipc file: {e}");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(self.io_err(e)),
        };

        entries.push(wire_entry(std::process::id(), payload, Utc::now()));
        let text = serde_json::to_string(&entries).map_err(|e| IpcError::Io {
            path: self.path.clone(),
            error: e.to_string(),
        })?;
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|e| self.io_err(e))
    }

    /// Starts the receive loop and returns its batch stream.
    ///
    /// The loop drives off a debounced watch on the file's directory plus
    /// an idle poll, claims the file (remove before parse), validates each
    /// entry, and yields non-empty batches in arrival order. The sequence
    /// is infinite until `token` is cancelled, and restartable: calling
    /// `receive` again begins a fresh, independent loop.
    pub fn receive(&self, token: CancellationToken) -> mpsc::Receiver<Vec<IpcMessage>> {
        let (tx, rx) = mpsc::channel::<Vec<IpcMessage>>(32);
        let ipc = self.clone();

        tokio::spawn(async move {
            let dir = ipc
                .path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            let _ = tokio::fs::create_dir_all(&dir).await;

            let watch_cfg = WatchConfig {
                paths: vec![dir],
                include: Vec::new(),
                debounce: ipc.debounce,
            };
            // The idle poll below keeps the loop alive even without a watcher.
            let mut watch_rx = match spawn_watcher(&watch_cfg, token.child_token()) {
                Ok((handle, rx)) => Some((handle, rx)),
                Err(e) => {
                    warn!(path = %ipc.path.display(), "ipc watch disabled: {e}");
                    None
                }
            };

            let mut poll = tokio::time::interval(ipc.poll_interval);
            poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            // Claim whatever is already waiting before the first event.
            if let Some(batch) = ipc.drain().await {
                if tx.send(batch).await.is_err() {
                    return;
                }
            }

            loop {
                let touched = tokio::select! {
                    _ = token.cancelled() => break,
                    _ = poll.tick() => true,
                    batch = recv_watch(&mut watch_rx) => batch
                        .modified
                        .iter()
                        .chain(batch.other.iter())
                        .any(|p| p == &ipc.path),
                };
                if !touched {
                    continue;
                }
                if let Some(batch) = ipc.drain().await {
                    if tx.send(batch).await.is_err() {
                        break;
                    }
                }
            }
        });

        rx
    }

    /// Stops nothing by itself (the receive loop owns its token) but
    /// best-effort deletes the shared file; failures are swallowed.
    pub async fn close(&self) {
        let _ = tokio::fs::remove_file(&self.path).await;
    }

    /// Claims and validates the current file content, if any.
    async fn drain(&self) -> Option<Vec<IpcMessage>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), "ipc read failed: {e}");
                return None;
            }
        };

        // Claim before parsing so a second reader cannot consume the batch.
        let _ = tokio::fs::remove_file(&self.path).await;

        let entries = match serde_json::from_str::<Vec<Value>>(&text) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path.display(), "unreadable ipc file treated as empty: {e}");
                return None;
            }
        };

        let now = Utc::now();
        let batch: Vec<IpcMessage> = entries
            .iter()
            .map(|entry| IpcMessage::validate(entry, now, self.staleness, self.max_payload))
            .collect();
        if batch.is_empty() {
            return None;
        }
        debug!(path = %self.path.display(), count = batch.len(), "ipc batch claimed");
        Some(batch)
    }

    fn io_err(&self, e: std::io::Error) -> IpcError {
        IpcError::Io {
            path: self.path.clone(),
            error: e.to_string(),
        }
    }
}

/// Next watch batch; pends forever when watching is unavailable or ended,
/// leaving the idle poll as the only wake-up source.
async fn recv_watch(
    watch: &mut Option<(crate::triggers::WatcherHandle, mpsc::Receiver<crate::triggers::WatchBatch>)>,
) -> crate::triggers::WatchBatch {
    match watch {
        Some((_, rx)) => match rx.recv().await {
            Some(batch) => batch,
            None => std::future::pending().await,
        },
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(dir: &tempfile::TempDir) -> FileIpc {
        FileIpc::new(dir.path().join("control.json"))
            .with_poll_interval(Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_send_then_receive_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ipc = endpoint(&dir);
        ipc.send("one").await.expect("send");
        ipc.send("two").await.expect("send");

        let token = CancellationToken::new();
        let mut rx = ipc.receive(token.clone());
        let batch = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("batch in time")
            .expect("stream open");
        let payloads: Vec<_> = batch.iter().filter_map(|m| m.payload.as_deref()).collect();
        assert_eq!(payloads, vec!["one", "two"]);
        assert!(batch.iter().all(|m| m.is_valid()));
        token.cancel();
    }

    #[tokio::test]
    async fn test_file_is_claimed_on_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ipc = endpoint(&dir);
        ipc.send("claim me").await.expect("send");

        let token = CancellationToken::new();
        let mut rx = ipc.receive(token.clone());
        let _ = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("batch in time");
        assert!(!ipc.path().exists(), "file must be removed on claim");
        token.cancel();
    }

    #[tokio::test]
    async fn test_oversized_send_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ipc = endpoint(&dir).with_max_payload(8);
        let err = ipc.send("way past the ceiling").await.unwrap_err();
        assert_eq!(err.as_label(), "ipc_oversized");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_treated_as_no_messages() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ipc = endpoint(&dir);
        tokio::fs::write(ipc.path(), "{ not json ]").await.expect("write");

        let token = CancellationToken::new();
        let mut rx = ipc.receive(token.clone());
        let res = tokio::time::timeout(Duration::from_millis(600), rx.recv()).await;
        assert!(res.is_err(), "corrupt content must not produce a batch");
        // A later valid send still gets through.
        ipc.send("after corruption").await.expect("send");
        let batch = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("batch in time")
            .expect("stream open");
        assert_eq!(batch[0].payload.as_deref(), Some("after corruption"));
        token.cancel();
    }

    #[tokio::test]
    async fn test_close_removes_file_best_effort() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ipc = endpoint(&dir);
        ipc.send("x").await.expect("send");
        ipc.close().await;
        assert!(!ipc.path().exists());
        // Closing again (file already gone) is fine.
        ipc.close().await;
    }
}
