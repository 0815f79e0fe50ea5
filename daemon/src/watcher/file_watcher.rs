//! Filesystem change notifications as an async stream.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Result;

/// A change under the watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Created(p) | WatchEvent::Modified(p) | WatchEvent::Removed(p) => p,
        }
    }
}

enum Handle {
    Raw(#[allow(dead_code)] RecommendedWatcher),
    Debounced(#[allow(dead_code)] Debouncer<RecommendedWatcher>),
}

/// Non-recursive directory watch. Dropping it cancels the watch.
///
/// Notifications are delivered on notify's own thread and forwarded over a
/// channel, so `recv` can sit in a `tokio::select!`.
pub struct FileWatcher {
    _handle: Handle,
    rx: mpsc::UnboundedReceiver<WatchEvent>,
}

impl FileWatcher {
    /// Report every create/modify/remove in `dir` as it happens.
    pub fn watch_dir(dir: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "File watch error");
                    return;
                }
            };
            for path in event.paths {
                let change = match event.kind {
                    EventKind::Create(_) => WatchEvent::Created(path),
                    EventKind::Modify(_) => WatchEvent::Modified(path),
                    EventKind::Remove(_) => WatchEvent::Removed(path),
                    _ => continue,
                };
                if tx.send(change).is_err() {
                    debug!("File watch receiver dropped");
                    return;
                }
            }
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _handle: Handle::Raw(watcher),
            rx,
        })
    }

    /// Report changes to one file, coalesced over `delay`.
    ///
    /// The parent directory is watched so editors that save by rename are
    /// still seen.
    pub fn watch_file_debounced(file: &Path, delay: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let target = file.to_path_buf();
        let dir = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut debouncer = new_debouncer(delay, move |res: DebounceEventResult| match res {
            Ok(events) => {
                if events
                    .iter()
                    .any(|e| e.path.file_name() == target.file_name())
                {
                    let _ = tx.send(WatchEvent::Modified(target.clone()));
                }
            }
            Err(e) => warn!(error = %e, "Config watch error"),
        })?;
        debouncer.watcher().watch(&dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _handle: Handle::Debounced(debouncer),
            rx,
        })
    }

    /// Next change, or `None` once the underlying watcher is gone.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn reports_new_files() {
        let dir = TempDir::new().unwrap();
        let mut watcher = FileWatcher::watch_dir(dir.path()).unwrap();

        let path = dir.path().join("output_log_x.txt");
        fs::write(&path, "hello\n").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), watcher.recv())
            .await
            .expect("no watch event")
            .expect("watcher closed");
        assert_eq!(event.path().file_name(), path.file_name());
    }
}
