//! Instance monitor: ties locator, tailer, parser and world tracker together.
//!
//! One background task wakes on filesystem notifications and on a poll
//! interval (notifications are unreliable on some platforms) and runs a read
//! pass each time. Passes do blocking file I/O and run on the blocking pool.
//! They are single-flight: a pass requested while another is running returns
//! [`ReadPass::Busy`] without touching the file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{Mutex, Notify, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::event::DomainEvent;
use super::file_watcher::{FileWatcher, WatchEvent};
use super::locator::{LogFileConfig, LogLocator};
use super::log_parser::LogParser;
use super::tailer::{bootstrap_scan, LogTailer};
use super::world_tracker::{WorldContext, WorldTracker};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub log_dir: PathBuf,
    pub naming: LogFileConfig,
    pub poll_interval: Duration,
    pub local_actor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorStatus {
    pub is_running: bool,
    pub current_world: Option<WorldContext>,
    pub log_file: Option<PathBuf>,
    pub last_activity: Option<DateTime<Utc>>,
}

/// What a read pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPass {
    /// Another pass was in flight.
    Busy,
    /// The monitor is not running.
    Stopped,
    /// No log file exists yet.
    NoFile,
    /// Reading failed; the next tick retries.
    Failed,
    Read { forwarded: usize, truncated: bool },
}

struct MonitorCore {
    locator: LogLocator,
    parser: Arc<LogParser>,
    tailer: Option<LogTailer>,
    tracker: WorldTracker,
    events: Option<UnboundedSender<DomainEvent>>,
    last_activity: Option<DateTime<Utc>>,
    running: bool,
}

impl MonitorCore {
    fn emit(&self, event: DomainEvent) {
        if let Some(events) = &self.events {
            if events.send(event).is_err() {
                debug!("Domain event receiver dropped");
            }
        }
    }

    fn current_path(&self) -> Option<&std::path::Path> {
        self.tailer.as_ref().map(|t| t.path())
    }

    /// Switch to `path`: forget the old world, recover the current one from
    /// the file's history, then tail from its end.
    fn switch_to(&mut self, path: PathBuf) {
        self.tailer = None;
        self.tracker.reset();

        match bootstrap_scan(&path, &self.parser) {
            Ok(found) => {
                for event in [&found.instance_join, &found.world_enter]
                    .into_iter()
                    .flatten()
                {
                    self.tracker.restore(event);
                }
                info!(
                    path = %path.display(),
                    world = ?self.tracker.context().world_name,
                    offset = found.end_offset,
                    "Watching log file"
                );
                self.tailer = Some(LogTailer::open_at(path, found.end_offset));
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to open log file"),
        }
    }

    fn locate(&mut self) {
        match self.locator.latest() {
            Ok(Some(latest)) => {
                if self.current_path() != Some(latest.as_path()) {
                    self.switch_to(latest);
                }
            }
            Ok(None) => debug!(dir = %self.locator.dir().display(), "No log file yet"),
            Err(e) => warn!(error = %e, "Failed to scan log directory"),
        }
    }

    fn on_watch_event(&mut self, change: &WatchEvent) {
        if let WatchEvent::Created(path) = change {
            if self.locator.is_log_file(path) {
                debug!(path = %path.display(), "New log file appeared");
                self.locate();
            }
        }
    }

    fn read_pass(&mut self) -> ReadPass {
        if !self.running {
            return ReadPass::Stopped;
        }
        if self.tailer.is_none() {
            self.locate();
        }
        let Some(tailer) = self.tailer.as_mut() else {
            return ReadPass::NoFile;
        };

        let read = match tailer.read_new() {
            Ok(read) => read,
            Err(e) => {
                warn!(path = %tailer.path().display(), error = %e, "Failed to read log");
                if let crate::Error::Io(io) = &e {
                    if io.kind() == std::io::ErrorKind::NotFound {
                        self.tailer = None;
                    }
                }
                return ReadPass::Failed;
            }
        };
        if let Some(at) = tailer.state().last_activity {
            self.last_activity = Some(at);
        }

        if read.truncated {
            info!("Log file truncated, resetting world state");
            self.tracker.reset();
        }

        let mut forwarded = 0;
        for line in &read.lines {
            let Some(kind) = self.parser.classify(line) else {
                continue;
            };
            if let Some(kind) = self.tracker.observe(kind) {
                self.emit(DomainEvent::now(kind));
                forwarded += 1;
            }
        }
        if !read.lines.is_empty() {
            debug!(
                lines = read.lines.len(),
                forwarded,
                state = ?self.tracker.state(),
                "Read pass"
            );
        }

        ReadPass::Read {
            forwarded,
            truncated: read.truncated,
        }
    }
}

/// Start/stop/status service over the upstream application's log.
pub struct InstanceMonitor {
    core: Arc<Mutex<MonitorCore>>,
    poll_interval: Duration,
    task: Option<(Arc<Notify>, JoinHandle<()>)>,
}

impl InstanceMonitor {
    pub fn new(options: MonitorOptions, parser: Arc<LogParser>) -> Self {
        Self {
            core: Arc::new(Mutex::new(MonitorCore {
                locator: LogLocator::new(options.log_dir, options.naming),
                parser,
                tailer: None,
                tracker: WorldTracker::new(options.local_actor),
                events: None,
                last_activity: None,
                running: false,
            })),
            poll_interval: options.poll_interval,
            task: None,
        }
    }

    /// Start watching. Returns `Ok(false)` if the log directory does not
    /// exist; nothing is retried, call `start` again later.
    pub async fn start(&mut self, events: UnboundedSender<DomainEvent>) -> Result<bool> {
        if self.task.is_some() {
            return Ok(true);
        }

        let watcher = {
            let mut core = self.core.lock().await;
            if !core.locator.dir_exists() {
                warn!(dir = %core.locator.dir().display(), "Log directory not found");
                return Ok(false);
            }
            let watcher = FileWatcher::watch_dir(core.locator.dir())?;
            core.events = Some(events);
            core.running = true;
            watcher
        };
        let core = Arc::clone(&self.core).lock_owned().await;
        run_blocking(core, |core| core.locate()).await;

        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.core),
            watcher,
            self.poll_interval,
            Arc::clone(&shutdown),
        ));
        self.task = Some((shutdown, handle));
        info!("Instance monitor started");
        Ok(true)
    }

    /// Stop watching. Once this returns no read pass can run.
    pub async fn stop(&mut self) {
        if let Some((shutdown, handle)) = self.task.take() {
            shutdown.notify_one();
            if let Err(e) = handle.await {
                warn!(error = %e, "Monitor task ended abnormally");
            }
        }

        let mut core = self.core.lock().await;
        core.running = false;
        core.tailer = None;
        core.events = None;
        core.tracker.reset();
        info!("Instance monitor stopped");
    }

    pub async fn status(&self) -> MonitorStatus {
        let core = self.core.lock().await;
        let context = core.tracker.context();
        MonitorStatus {
            is_running: core.running,
            current_world: context.is_known().then(|| context.clone()),
            log_file: core.current_path().map(PathBuf::from),
            last_activity: core.last_activity,
        }
    }

    pub async fn set_local_actor(&self, local_actor: Option<String>) {
        let mut core = self.core.lock().await;
        if core.tracker.local_actor() != local_actor.as_deref() {
            info!(local_actor = ?local_actor, "Local actor changed");
            core.tracker.set_local_actor(local_actor);
        }
    }

    /// Run one read pass now unless one is already in flight.
    pub async fn read_new_lines(&self) -> ReadPass {
        guarded_pass(&self.core, None).await
    }
}

/// Run `f` on the blocking pool with the core locked for its duration.
async fn run_blocking<T, F>(mut core: OwnedMutexGuard<MonitorCore>, f: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce(&mut MonitorCore) -> T + Send + 'static,
{
    match tokio::task::spawn_blocking(move || f(&mut *core)).await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "Read pass task failed");
            None
        }
    }
}

async fn guarded_pass(core: &Arc<Mutex<MonitorCore>>, change: Option<WatchEvent>) -> ReadPass {
    let Ok(core) = Arc::clone(core).try_lock_owned() else {
        debug!("Read pass already in flight");
        return ReadPass::Busy;
    };
    run_blocking(core, move |core| {
        if let Some(change) = &change {
            core.on_watch_event(change);
        }
        core.read_pass()
    })
    .await
    .unwrap_or(ReadPass::Failed)
}

async fn run_loop(
    core: Arc<Mutex<MonitorCore>>,
    mut watcher: FileWatcher,
    poll_interval: Duration,
    shutdown: Arc<Notify>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut watching = true;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => break,
            change = watcher.recv(), if watching => match change {
                Some(change) => {
                    debug!(path = %change.path().display(), "Log directory changed");
                    guarded_pass(&core, Some(change)).await;
                }
                None => {
                    warn!("File watch closed, polling only");
                    watching = false;
                }
            },
            _ = ticker.tick() => {
                guarded_pass(&core, None).await;
            }
        }
    }

    drop(watcher);
    debug!("Monitor loop exited");
}
