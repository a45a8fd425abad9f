//! # Debounced filesystem watcher.
//!
//! Produces a lazy, restartable, infinite sequence of **batched**
//! filesystem-change events for a configured set of paths, debounced and
//! filtered by glob rules.
//!
//! ```text
//! notify (OS thread) ──► unbounded channel ──► debounce task ──► WatchBatch
//!                                               (collects events for
//!                                                `debounce` after the
//!                                                first one arrives)
//! ```
//!
//! ## Rules
//! - The returned [`WatcherHandle`] keeps the underlying OS watcher alive;
//!   dropping it stops watching.
//! - Batches are only emitted when at least one event survives the glob
//!   filter; empty batches are suppressed.
//! - A path that cannot be watched is logged and skipped — one bad entry
//!   does not disable the rest of the set.

use std::path::PathBuf;
use std::time::Duration;

use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ProcessError;

/// Configuration of one watched path set.
#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// Roots to watch, recursively.
    pub paths: Vec<PathBuf>,
    /// Glob patterns a changed path must match; empty means "everything".
    pub include: Vec<String>,
    /// Quiet window: events arriving within this window join one batch.
    pub debounce: Duration,
}

impl WatchConfig {
    /// Watches `paths` recursively with a 500 ms debounce and no filter.
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            include: Vec::new(),
            debounce: Duration::from_millis(500),
        }
    }
}

/// One debounced batch of filesystem changes.
#[derive(Clone, Debug, Default)]
pub struct WatchBatch {
    /// Paths reported with a modify event.
    pub modified: Vec<PathBuf>,
    /// Paths reported with any other event kind (create, remove, ...).
    pub other: Vec<PathBuf>,
}

impl WatchBatch {
    /// True when the batch contains at least one modify event.
    #[inline]
    pub fn has_modify(&self) -> bool {
        !self.modified.is_empty()
    }

    /// First path in the batch, for log lines.
    pub fn first_path(&self) -> Option<&PathBuf> {
        self.modified.first().or_else(|| self.other.first())
    }

    fn is_empty(&self) -> bool {
        self.modified.is_empty() && self.other.is_empty()
    }
}

/// Keep-alive handle for a spawned watcher.
///
/// Exists mainly so the underlying [`RecommendedWatcher`] lives as long as
/// needed; dropping it stops file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Spawns a watcher over `cfg` and returns its handle plus the batch stream.
///
/// The stream ends when `token` is cancelled or the handle is dropped.
/// Calling this again with the same config starts a fresh, independent
/// sequence.
pub fn spawn_watcher(
    cfg: &WatchConfig,
    token: CancellationToken,
) -> Result<(WatcherHandle, mpsc::Receiver<WatchBatch>), ProcessError> {
    let filter = build_globset(&cfg.include)?;

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                let _ = event_tx.send(event);
            }
            Err(err) => {
                warn!("file watch error: {err}");
            }
        },
        notify::Config::default(),
    )
    .map_err(|e| ProcessError::Watch {
        error: e.to_string(),
    })?;

    for path in &cfg.paths {
        if let Err(e) = watcher.watch(path, RecursiveMode::Recursive) {
            warn!(path = %path.display(), "cannot watch: {e}");
        }
    }

    let (batch_tx, batch_rx) = mpsc::channel::<WatchBatch>(16);
    let debounce = cfg.debounce;

    tokio::spawn(async move {
        loop {
            // Block until the first event of the next batch (or shutdown).
            let first = tokio::select! {
                _ = token.cancelled() => break,
                ev = event_rx.recv() => match ev {
                    Some(ev) => ev,
                    None => break,
                },
            };

            let mut batch = WatchBatch::default();
            accumulate(&mut batch, first, filter.as_ref());

            // Keep folding events into the batch until the window closes.
            let window = tokio::time::sleep(debounce);
            tokio::pin!(window);
            loop {
                tokio::select! {
                    _ = &mut window => break,
                    _ = token.cancelled() => return,
                    ev = event_rx.recv() => match ev {
                        Some(ev) => accumulate(&mut batch, ev, filter.as_ref()),
                        None => break,
                    },
                }
            }

            if !batch.is_empty() {
                debug!(
                    modified = batch.modified.len(),
                    other = batch.other.len(),
                    "watch batch"
                );
                if batch_tx.send(batch).await.is_err() {
                    break;
                }
            }
        }
    });

    Ok((WatcherHandle { _inner: watcher }, batch_rx))
}

fn build_globset(include: &[String]) -> Result<Option<GlobSet>, ProcessError> {
    if include.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in include {
        let glob = Glob::new(pattern).map_err(|e| ProcessError::Watch {
            error: format!("bad glob {pattern:?}: {e}"),
        })?;
        builder.add(glob);
    }
    let set = builder.build().map_err(|e| ProcessError::Watch {
        error: e.to_string(),
    })?;
    Ok(Some(set))
}

fn accumulate(batch: &mut WatchBatch, event: notify::Event, filter: Option<&GlobSet>) {
    let is_modify = matches!(event.kind, notify::EventKind::Modify(_));
    for path in event.paths {
        if let Some(set) = filter {
            if !set.is_match(&path) {
                continue;
            }
        }
        if is_modify {
            batch.modified.push(path);
        } else {
            batch.other.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_modify_event_lands_in_batch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("unit.conf");
        std::fs::write(&file, "a").expect("seed");

        let cfg = WatchConfig {
            paths: vec![dir.path().to_path_buf()],
            include: Vec::new(),
            debounce: Duration::from_millis(100),
        };
        let token = CancellationToken::new();
        let (_handle, mut rx) = spawn_watcher(&cfg, token.clone()).expect("spawn");

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(&file, "bb").expect("touch");

        let batch = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("batch within 5s")
            .expect("stream open");
        assert!(batch.has_modify());
        token.cancel();
    }

    #[tokio::test]
    async fn test_glob_filter_drops_unmatched_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = WatchConfig {
            paths: vec![dir.path().to_path_buf()],
            include: vec!["**/*.rs".into()],
            debounce: Duration::from_millis(100),
        };
        let token = CancellationToken::new();
        let (_handle, mut rx) = spawn_watcher(&cfg, token.clone()).expect("spawn");

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(dir.path().join("notes.txt"), "x").expect("write");

        // The only change is filtered out, so no batch may arrive.
        let res = tokio::time::timeout(Duration::from_millis(600), rx.recv()).await;
        assert!(res.is_err(), "filtered-out change must not produce a batch");
        token.cancel();
    }

    #[test]
    fn test_bad_glob_is_a_setup_error() {
        let err = build_globset(&["a{".into()]).unwrap_err();
        assert_eq!(err.as_label(), "process_watch_failed");
    }
}
