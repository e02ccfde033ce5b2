//! # Background Change Detection
//!
//! One tokio task per watching manager. The task wakes on a poll interval
//! and, optionally, on file-system events from `notify`, and runs the
//! caller's reload callback each time.
//!
//! Stopping is explicit: [`WatchHandle::stop`] signals the task and waits for
//! it, so a reload that is already running finishes and none starts later.

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Watch loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOptions {
    pub poll_interval: Duration,
    /// Also wake on `notify` file-system events for the watched paths.
    pub fs_events: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            fs_events: true,
        }
    }
}

/// Why the watch loop woke up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchWake {
    Poll,
    Changed(PathBuf),
}

pub struct WatchHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Signals the loop and waits until it has exited.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            error!(fatal = true, "Watch task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the watch loop.
///
/// `on_wake` returns `false` to end the loop (for example when the owning
/// manager is gone).
pub fn spawn_watch<F, Fut>(paths: Vec<PathBuf>, options: WatchOptions, mut on_wake: F) -> WatchHandle
where
    F: FnMut(WatchWake) -> Fut + Send + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    let (shutdown, mut shutdown_rx) = oneshot::channel();

    let task = tokio::spawn(async move {
        let (event_tx, mut event_rx) = mpsc::channel(64);
        let targets: Vec<WatchTarget> = paths.iter().map(|p| WatchTarget::new(p)).collect();

        // Kept alive for the lifetime of the loop.
        let _watcher = if options.fs_events && !targets.is_empty() {
            start_fs_watcher(&targets, event_tx)
        } else {
            drop(event_tx);
            None
        };

        let mut ticker = tokio::time::interval(options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!(paths = ?paths, interval = ?options.poll_interval, "Configuration watch started");

        loop {
            let wake = tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => WatchWake::Poll,
                Some(result) = event_rx.recv() => match result {
                    Ok(event) => match relevant_path(&event, &targets) {
                        Some(path) => WatchWake::Changed(path),
                        None => continue,
                    },
                    Err(e) => {
                        warn!("Watch error: {}", e);
                        continue;
                    }
                },
            };

            if !on_wake(wake).await {
                debug!("Watch owner dropped, stopping");
                break;
            }
        }

        info!(paths = ?paths, "Configuration watch stopped");
    });

    WatchHandle { shutdown, task }
}

/// A watched file, identified by its (canonical) parent directory and name.
///
/// Editors often replace files by rename, which drops an inode watch, so the
/// parent directory is watched and events are filtered by name.
struct WatchTarget {
    dir: PathBuf,
    name: Option<OsString>,
}

impl WatchTarget {
    fn new(path: &Path) -> Self {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self {
            dir: canonical(&dir),
            name: path.file_name().map(|n| n.to_os_string()),
        }
    }

    fn matches(&self, path: &Path) -> bool {
        let Some(name) = &self.name else {
            return false;
        };
        if path.file_name() != Some(name.as_os_str()) {
            return false;
        }
        path.parent().is_some_and(|parent| canonical(parent) == self.dir)
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn start_fs_watcher(
    targets: &[WatchTarget],
    events: mpsc::Sender<notify::Result<notify::Event>>,
) -> Option<RecommendedWatcher> {
    let mut watcher = match RecommendedWatcher::new(
        move |res| {
            // Bursts coalesce into a single reload check.
            let _ = events.try_send(res);
        },
        notify::Config::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            warn!("Failed to create file watcher, falling back to polling: {}", e);
            return None;
        }
    };

    let mut dirs: Vec<&Path> = Vec::new();
    for target in targets {
        if !dirs.contains(&target.dir.as_path()) {
            dirs.push(&target.dir);
        }
    }
    for dir in dirs {
        if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
            warn!(dir = ?dir, "Failed to watch directory: {}", e);
        }
    }
    Some(watcher)
}

fn relevant_path(event: &notify::Event, targets: &[WatchTarget]) -> Option<PathBuf> {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return None;
    }
    event
        .paths
        .iter()
        .find(|p| targets.iter().any(|t| t.matches(p)))
        .cloned()
}
