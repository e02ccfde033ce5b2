//! # Reloading Strategies
//!
//! A [`ReloadingStrategy`] decides when a manager's sources must be re-read
//! and is told when a reload completed.
//!
//! ## Lifecycle
//! ```text
//! Unconfigured --set_configuration + init--> Armed
//! Armed        --need_reloading == true----> NeedsReload
//! NeedsReload  --reloading_performed-------> Armed
//! ```
//! A failed reload skips `reloading_performed`, so the strategy stays in
//! `NeedsReload` and the next check retries.

use async_trait::async_trait;
use errors::{ConfigError, Result};
use parking_lot::RwLock;
use reqwest::Url;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};
use tokio::time::Instant;
use tracing::{debug, trace};

/// Where a manager's configuration last came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LastSource {
    #[default]
    None,
    Files(Vec<PathBuf>),
    Remote(Url),
}

#[derive(Debug, Default)]
pub(crate) struct Sources {
    pub(crate) loaded: Vec<PathBuf>,
    pub(crate) watched: Vec<PathBuf>,
    pub(crate) url: Option<Url>,
    pub(crate) last: LastSource,
}

/// Read-only view of a manager's sources, handed to strategies.
#[derive(Debug, Clone, Default)]
pub struct SourceView {
    inner: Arc<RwLock<Sources>>,
}

impl SourceView {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut Sources) -> R) -> R {
        f(&mut self.inner.write())
    }

    pub fn loaded_paths(&self) -> Vec<PathBuf> {
        self.inner.read().loaded.clone()
    }

    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.inner.read().watched.clone()
    }

    /// Loaded paths followed by watched paths, without duplicates.
    pub fn tracked_paths(&self) -> Vec<PathBuf> {
        let sources = self.inner.read();
        let mut paths: Vec<PathBuf> = Vec::new();
        for path in sources.loaded.iter().chain(sources.watched.iter()) {
            if !paths.contains(path) {
                paths.push(path.clone());
            }
        }
        paths
    }

    pub fn url(&self) -> Option<Url> {
        self.inner.read().url.clone()
    }

    pub fn last_source(&self) -> LastSource {
        self.inner.read().last.clone()
    }
}

/// Policy deciding when a reload is due.
#[async_trait]
pub trait ReloadingStrategy: Send + Sync {
    /// Bind the strategy to the sources of the owning manager.
    fn set_configuration(&mut self, sources: SourceView);

    async fn init(&mut self) -> Result<()>;

    async fn need_reloading(&mut self) -> Result<bool>;

    /// Called after a successful reload.
    async fn reloading_performed(&mut self) -> Result<()>;
}

/// Due when the modification time of any tracked file changes.
///
/// The file system is consulted at most once per `refresh_delay`; a change
/// seen once stays pending until [`ReloadingStrategy::reloading_performed`].
/// The acknowledgement commits the modification times seen when the change
/// was detected, so an edit landing during the reload is still picked up.
#[derive(Debug)]
pub struct FileChangedStrategy {
    sources: Option<SourceView>,
    refresh_delay: Duration,
    last_checked: Option<Instant>,
    stamps: HashMap<PathBuf, Option<SystemTime>>,
    observed: HashMap<PathBuf, Option<SystemTime>>,
    pending: bool,
}

impl Default for FileChangedStrategy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl FileChangedStrategy {
    pub fn new(refresh_delay: Duration) -> Self {
        Self {
            sources: None,
            refresh_delay,
            last_checked: None,
            stamps: HashMap::new(),
            observed: HashMap::new(),
            pending: false,
        }
    }

    pub fn refresh_delay(&self) -> Duration {
        self.refresh_delay
    }

    fn bound(&self) -> Result<&SourceView> {
        self.sources
            .as_ref()
            .ok_or_else(|| ConfigError::strategy("file-changed strategy used before set_configuration"))
    }

    async fn snapshot(&mut self) -> Result<()> {
        let paths = self.bound()?.tracked_paths();
        let mut stamps = HashMap::with_capacity(paths.len());
        for path in paths {
            let stamp = modified(&path).await;
            stamps.insert(path, stamp);
        }
        self.stamps = stamps;
        self.observed.clear();
        self.last_checked = Some(Instant::now());
        Ok(())
    }
}

async fn modified(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path)
        .await
        .and_then(|meta| meta.modified())
        .ok()
}

#[async_trait]
impl ReloadingStrategy for FileChangedStrategy {
    fn set_configuration(&mut self, sources: SourceView) {
        self.sources = Some(sources);
    }

    async fn init(&mut self) -> Result<()> {
        self.pending = false;
        self.snapshot().await
    }

    async fn need_reloading(&mut self) -> Result<bool> {
        if self.pending {
            return Ok(true);
        }
        if let Some(last) = self.last_checked {
            if last.elapsed() < self.refresh_delay {
                return Ok(false);
            }
        }

        let paths = self.bound()?.tracked_paths();
        let mut observed = HashMap::with_capacity(paths.len());
        for path in paths {
            let current = modified(&path).await;
            match self.stamps.get(&path) {
                Some(previous) if *previous != current => {
                    debug!(path = ?path, "Tracked configuration file changed");
                    self.pending = true;
                }
                Some(_) => {}
                // Paths added after init (a later `watch` or `load`) only start being tracked.
                None => {
                    trace!(path = ?path, "Started tracking configuration file");
                    self.stamps.insert(path.clone(), current);
                }
            }
            observed.insert(path, current);
        }
        if self.pending {
            self.observed = observed;
        }
        self.last_checked = Some(Instant::now());
        Ok(self.pending)
    }

    async fn reloading_performed(&mut self) -> Result<()> {
        self.pending = false;
        self.stamps.extend(self.observed.drain());
        self.last_checked = Some(Instant::now());
        Ok(())
    }
}

/// Due once `interval` has elapsed since the last completed reload.
#[derive(Debug)]
pub struct PeriodicStrategy {
    interval: Duration,
    last: Option<Instant>,
}

impl PeriodicStrategy {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }
}

#[async_trait]
impl ReloadingStrategy for PeriodicStrategy {
    fn set_configuration(&mut self, _sources: SourceView) {}

    async fn init(&mut self) -> Result<()> {
        self.last = Some(Instant::now());
        Ok(())
    }

    async fn need_reloading(&mut self) -> Result<bool> {
        let last = self
            .last
            .ok_or_else(|| ConfigError::strategy("periodic strategy used before init"))?;
        Ok(last.elapsed() >= self.interval)
    }

    async fn reloading_performed(&mut self) -> Result<()> {
        self.last = Some(Instant::now());
        Ok(())
    }
}

/// Cloneable handle that marks a [`ManualStrategy`] as due.
#[derive(Debug, Clone, Default)]
pub struct ReloadTrigger {
    flag: Arc<AtomicBool>,
}

impl ReloadTrigger {
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Due only after its [`ReloadTrigger`] fired.
///
/// A trigger is consumed by `need_reloading`; one fired while a reload is
/// running stays set for the next check.
#[derive(Debug, Default)]
pub struct ManualStrategy {
    trigger: ReloadTrigger,
    pending: bool,
}

impl ManualStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger_handle(&self) -> ReloadTrigger {
        self.trigger.clone()
    }
}

#[async_trait]
impl ReloadingStrategy for ManualStrategy {
    fn set_configuration(&mut self, _sources: SourceView) {}

    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    async fn need_reloading(&mut self) -> Result<bool> {
        if self.trigger.flag.swap(false, Ordering::SeqCst) {
            self.pending = true;
        }
        Ok(self.pending)
    }

    async fn reloading_performed(&mut self) -> Result<()> {
        self.pending = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn view_with(paths: Vec<PathBuf>) -> SourceView {
        let view = SourceView::new();
        view.update(|s| s.loaded = paths);
        view
    }

    #[test]
    fn test_tracked_paths_dedup() {
        let view = SourceView::new();
        view.update(|s| {
            s.loaded = vec![PathBuf::from("a.json"), PathBuf::from("b.json")];
            s.watched = vec![PathBuf::from("b.json"), PathBuf::from("c.json")];
        });
        assert_eq!(
            view.tracked_paths(),
            vec![
                PathBuf::from("a.json"),
                PathBuf::from("b.json"),
                PathBuf::from("c.json")
            ]
        );
    }

    #[tokio::test]
    async fn test_file_changed_requires_binding() {
        let mut strategy = FileChangedStrategy::new(Duration::ZERO);
        let err = strategy.init().await.unwrap_err();
        assert!(matches!(err, ConfigError::StrategyError { .. }));
    }

    #[tokio::test]
    async fn test_file_changed_detects_modification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.json");
        fs::write(&path, "{}").unwrap();

        let mut strategy = FileChangedStrategy::new(Duration::ZERO);
        strategy.set_configuration(view_with(vec![path.clone()]));
        strategy.init().await.unwrap();
        assert!(!strategy.need_reloading().await.unwrap());

        // Some file systems only keep whole-second mtimes.
        let later = SystemTime::now() + Duration::from_secs(5);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();

        assert!(strategy.need_reloading().await.unwrap());
        // stays pending until acknowledged
        assert!(strategy.need_reloading().await.unwrap());
        strategy.reloading_performed().await.unwrap();
        assert!(!strategy.need_reloading().await.unwrap());
    }

    #[tokio::test]
    async fn test_file_changed_detects_removal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.json");
        fs::write(&path, "{}").unwrap();

        let mut strategy = FileChangedStrategy::new(Duration::ZERO);
        strategy.set_configuration(view_with(vec![path.clone()]));
        strategy.init().await.unwrap();
        fs::remove_file(&path).unwrap();
        assert!(strategy.need_reloading().await.unwrap());
    }

    #[tokio::test]
    async fn test_file_changed_refresh_delay_throttles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.json");
        fs::write(&path, "{}").unwrap();

        let mut strategy = FileChangedStrategy::new(Duration::from_secs(3600));
        strategy.set_configuration(view_with(vec![path.clone()]));
        strategy.init().await.unwrap();
        fs::remove_file(&path).unwrap();
        assert!(!strategy.need_reloading().await.unwrap());
    }

    #[tokio::test]
    async fn test_new_watched_path_does_not_fire() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.json");
        let second = dir.path().join("b.json");
        fs::write(&first, "{}").unwrap();
        fs::write(&second, "{}").unwrap();

        let view = view_with(vec![first]);
        let mut strategy = FileChangedStrategy::new(Duration::ZERO);
        strategy.set_configuration(view.clone());
        strategy.init().await.unwrap();

        view.update(|s| s.watched.push(second));
        assert!(!strategy.need_reloading().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_strategy() {
        let mut strategy = PeriodicStrategy::new(Duration::from_secs(10));
        assert!(strategy.need_reloading().await.is_err());

        strategy.init().await.unwrap();
        assert!(!strategy.need_reloading().await.unwrap());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(strategy.need_reloading().await.unwrap());

        strategy.reloading_performed().await.unwrap();
        assert!(!strategy.need_reloading().await.unwrap());
    }

    #[tokio::test]
    async fn test_manual_strategy() {
        let mut strategy = ManualStrategy::new();
        let trigger = strategy.trigger_handle();
        strategy.init().await.unwrap();
        assert!(!strategy.need_reloading().await.unwrap());

        trigger.trigger();
        assert!(strategy.need_reloading().await.unwrap());
        // a failed reload would skip the acknowledgement, so it stays due
        assert!(strategy.need_reloading().await.unwrap());

        strategy.reloading_performed().await.unwrap();
        assert!(!strategy.need_reloading().await.unwrap());
    }

    #[tokio::test]
    async fn test_manual_trigger_during_reload_is_kept() {
        let mut strategy = ManualStrategy::new();
        let trigger = strategy.trigger_handle();
        strategy.init().await.unwrap();

        trigger.trigger();
        assert!(strategy.need_reloading().await.unwrap());
        trigger.trigger();
        strategy.reloading_performed().await.unwrap();

        assert!(strategy.need_reloading().await.unwrap());
        strategy.reloading_performed().await.unwrap();
        assert!(!strategy.need_reloading().await.unwrap());
    }

    #[tokio::test]
    async fn test_file_edit_during_reload_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.json");
        fs::write(&path, "{}").unwrap();
        let set_mtime = |offset: u64| {
            fs::File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(SystemTime::now() + Duration::from_secs(offset))
                .unwrap();
        };

        let mut strategy = FileChangedStrategy::new(Duration::ZERO);
        strategy.set_configuration(view_with(vec![path.clone()]));
        strategy.init().await.unwrap();

        set_mtime(5);
        assert!(strategy.need_reloading().await.unwrap());
        // edited again after the reload read the file, before acknowledgement
        set_mtime(60);
        strategy.reloading_performed().await.unwrap();

        assert!(strategy.need_reloading().await.unwrap());
        strategy.reloading_performed().await.unwrap();
        assert!(!strategy.need_reloading().await.unwrap());
    }
}
