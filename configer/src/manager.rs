//! # File Configuration Manager
//!
//! Owns one [`ConfigStore`], one encoder/decoder pair, the record of where
//! the configuration came from, an optional [`ReloadingStrategy`] and an
//! optional background watch.
//!
//! ## Load semantics
//! - Every source is read and decoded before the store is touched; if any
//!   path fails the store is left exactly as it was
//! - Sources are merged in order under the manager's [`MergePolicy`]
//!   (later overrides earlier by default); sections merge recursively
//! - Every applied source is recorded as a layer (file set, remote URL, or a
//!   stream/merge overlay). `reload` replays all layers in order, so keys
//!   removed from a medium disappear while other layers are kept
//! - Unsynced `set` changes survive a reload unless a source defines the
//!   same key
//!
//! ## Concurrency
//! Readers go straight to the store. Writers (`load*`, `merge`, `reload`)
//! serialize on an async gate; at most one reload runs at a time because it
//! holds the strategy for its whole duration.

use crate::codec::{CodecPair, ConfigCodec, ConfigDecoder, ConfigEncoder};
use crate::field::{Field, Value};
use crate::merge::{MergePolicy, merge_all};
use crate::remote::{self, RemoteOptions};
use crate::section::Section;
use crate::store::{ConfigStore, Configurable, DEFAULT_DELIMITER};
use crate::strategy::{LastSource, ReloadingStrategy, SourceView};
use crate::watch::{self, WatchHandle, WatchOptions, WatchWake};
use environment::EnvInfo;
use errors::{ConfigError, Result};
use parking_lot::RwLock;
use reqwest::{Client, Url};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Builder for [`FileConfigManager`].
pub struct FileConfigManagerBuilder {
    codec: CodecPair,
    strategy: Option<Box<dyn ReloadingStrategy>>,
    policy: MergePolicy,
    delimiter: Option<char>,
    env: EnvInfo,
    remote: RemoteOptions,
    watch: WatchOptions,
    file_path: Option<PathBuf>,
    url: Option<Url>,
}

impl FileConfigManagerBuilder {
    pub fn strategy(mut self, strategy: impl ReloadingStrategy + 'static) -> Self {
        self.strategy = Some(Box::new(strategy));
        self
    }

    pub fn boxed_strategy(mut self, strategy: Box<dyn ReloadingStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn merge_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// `None` disables nested-key resolution.
    pub fn delimiter(mut self, delimiter: Option<char>) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn environment(mut self, env: EnvInfo) -> Self {
        self.env = env;
        self
    }

    pub fn remote_options(mut self, options: RemoteOptions) -> Self {
        self.remote = options;
        self
    }

    pub fn watch_options(mut self, options: WatchOptions) -> Self {
        self.watch = options;
        self
    }

    /// Primary file used by `sync`; defaults to the last loaded path.
    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Builds the manager and arms the strategy, if any.
    pub async fn build(self) -> Result<FileConfigManager> {
        let http = remote::build_client(&self.remote)?;
        let sources = SourceView::new();
        sources.update(|s| s.url = self.url.clone());

        let manager = FileConfigManager {
            inner: Arc::new(Inner {
                store: ConfigStore::with_delimiter(self.delimiter),
                encoder: RwLock::new(self.codec.encoder),
                decoder: RwLock::new(self.codec.decoder),
                strategy: Mutex::new(None),
                sources,
                policy: self.policy,
                env: self.env,
                remote: self.remote,
                watch_options: self.watch,
                watcher: Mutex::new(None),
                write_gate: Mutex::new(()),
                layers: RwLock::new(Vec::new()),
                http,
                file_path: RwLock::new(self.file_path),
            }),
        };

        if let Some(strategy) = self.strategy {
            manager.set_boxed_reload_strategy(strategy).await?;
        }
        Ok(manager)
    }
}

struct Inner {
    store: ConfigStore,
    encoder: RwLock<Arc<dyn ConfigEncoder>>,
    decoder: RwLock<Arc<dyn ConfigDecoder>>,
    strategy: Mutex<Option<Box<dyn ReloadingStrategy>>>,
    sources: SourceView,
    policy: MergePolicy,
    env: EnvInfo,
    remote: RemoteOptions,
    watch_options: WatchOptions,
    watcher: Mutex<Option<WatchHandle>>,
    write_gate: Mutex<()>,
    layers: RwLock<Vec<Layer>>,
    http: Client,
    file_path: RwLock<Option<PathBuf>>,
}

/// One applied source, replayed by `reload`.
#[derive(Debug, Clone)]
enum Layer {
    Files(Vec<PathBuf>),
    /// `cached` is reused when remote refresh is disabled.
    Remote { url: Url, cached: Section },
    Overlay(Section),
}

impl Layer {
    fn same_origin(&self, other: &Layer) -> bool {
        match (self, other) {
            (Layer::Files(a), Layer::Files(b)) => a == b,
            (Layer::Remote { url: a, .. }, Layer::Remote { url: b, .. }) => a == b,
            _ => false,
        }
    }
}

/// File/stream/remote-backed configuration with reload support.
///
/// Cheap to clone; clones share the same store and state.
#[derive(Clone)]
pub struct FileConfigManager {
    inner: Arc<Inner>,
}

impl FileConfigManager {
    pub fn builder<C: ConfigCodec + 'static>(codec: C) -> FileConfigManagerBuilder {
        Self::builder_with_pair(CodecPair::new(codec))
    }

    pub fn builder_with_pair(codec: CodecPair) -> FileConfigManagerBuilder {
        FileConfigManagerBuilder {
            codec,
            strategy: None,
            policy: MergePolicy::default(),
            delimiter: Some(DEFAULT_DELIMITER),
            env: EnvInfo::default(),
            remote: RemoteOptions::default(),
            watch: WatchOptions::default(),
            file_path: None,
            url: None,
        }
    }

    /// Manager with default settings and no reloading strategy.
    pub async fn new<C: ConfigCodec + 'static>(codec: C) -> Result<Self> {
        Self::builder(codec).build().await
    }

    pub fn store(&self) -> &ConfigStore {
        &self.inner.store
    }

    pub fn environment(&self) -> &EnvInfo {
        &self.inner.env
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.inner.policy
    }

    pub fn sources(&self) -> SourceView {
        self.inner.sources.clone()
    }

    pub fn encoder(&self) -> Arc<dyn ConfigEncoder> {
        Arc::clone(&self.inner.encoder.read())
    }

    pub fn decoder(&self) -> Arc<dyn ConfigDecoder> {
        Arc::clone(&self.inner.decoder.read())
    }

    pub fn set_encoder(&self, encoder: Arc<dyn ConfigEncoder>) {
        *self.inner.encoder.write() = encoder;
    }

    pub fn set_decoder(&self, decoder: Arc<dyn ConfigDecoder>) {
        *self.inner.decoder.write() = decoder;
    }

    pub fn set_codec<C: ConfigCodec + 'static>(&self, codec: C) {
        let pair = CodecPair::new(codec);
        self.set_encoder(pair.encoder);
        self.set_decoder(pair.decoder);
    }

    /// Primary file: the explicit one, else the last (highest precedence)
    /// loaded path.
    pub fn file_path(&self) -> Option<PathBuf> {
        if let Some(path) = self.inner.file_path.read().clone() {
            return Some(path);
        }
        self.inner.sources.loaded_paths().last().cloned()
    }

    pub fn set_file_path(&self, path: impl Into<PathBuf>) {
        *self.inner.file_path.write() = Some(path.into());
    }

    pub fn file_name(&self) -> Option<String> {
        self.file_path()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
    }

    pub fn url(&self) -> Option<Url> {
        self.inner.sources.url()
    }

    pub fn set_url(&self, url: Url) {
        self.inner.sources.update(|s| s.url = Some(url));
    }

    pub async fn has_reload_strategy(&self) -> bool {
        self.inner.strategy.lock().await.is_some()
    }

    /// Bind, initialize and install `strategy`, replacing any previous one.
    pub async fn set_reload_strategy(&self, strategy: impl ReloadingStrategy + 'static) -> Result<()> {
        self.set_boxed_reload_strategy(Box::new(strategy)).await
    }

    pub async fn set_boxed_reload_strategy(&self, mut strategy: Box<dyn ReloadingStrategy>) -> Result<()> {
        strategy.set_configuration(self.inner.sources.clone());
        strategy.init().await?;
        *self.inner.strategy.lock().await = Some(strategy);
        debug!("Reloading strategy armed");
        Ok(())
    }

    /// Remove the strategy; `reload` then always reloads.
    pub async fn clear_reload_strategy(&self) {
        *self.inner.strategy.lock().await = None;
    }

    /// `<app_root>/config/<name>.<ext>` followed by the environment overlay
    /// `<app_root>/config/<name>.<env>.<ext>` (absent for an unknown env).
    pub fn default_paths(&self, name: &str, ext: &str) -> Vec<PathBuf> {
        let dir = self.inner.env.app_root().join("config");
        let mut paths = vec![dir.join(format!("{}.{}", name, ext))];
        let kind = self.inner.env.kind();
        if kind != environment::EnvKind::Unknown {
            paths.push(dir.join(format!("{}.{}.{}", name, kind, ext)));
        }
        paths
    }

    /// Load the base file from [`default_paths`](Self::default_paths) plus the
    /// environment overlay when it exists.
    pub async fn load_defaults(&self, name: &str, ext: &str) -> Result<()> {
        let mut paths = self.default_paths(name, ext);
        if paths.len() > 1 && !tokio::fs::try_exists(&paths[1]).await.unwrap_or(false) {
            debug!(overlay = ?paths[1], "No environment overlay, loading base only");
            paths.truncate(1);
        }
        self.load(&paths).await
    }

    /// Decode `paths` in order and merge them into the store.
    pub async fn load<P: AsRef<Path>>(&self, paths: &[P]) -> Result<()> {
        let paths: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
        if paths.is_empty() {
            debug!("Load called without paths");
            return Ok(());
        }

        let _gate = self.inner.write_gate.lock().await;
        let staged = self.decode_paths(&paths).await?;
        let changes = self.inner.store.merge(staged, self.inner.policy)?;

        self.record_layer(Layer::Files(paths.clone()));
        self.inner.sources.update(|s| {
            for path in &paths {
                if !s.loaded.contains(path) {
                    s.loaded.push(path.clone());
                }
            }
            s.last = LastSource::Files(paths.clone());
        });
        info!(paths = ?paths, changed = changes.len(), "Configuration loaded");
        Ok(())
    }

    pub async fn load_stream<R: AsyncRead + Unpin>(&self, mut reader: R) -> Result<()> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .await
            .map_err(|e| ConfigError::io("stream", e))?;

        let _gate = self.inner.write_gate.lock().await;
        let section = self.decoder().decode(&bytes)?;
        let changes = self.inner.store.merge(section.clone(), self.inner.policy)?;
        self.record_layer(Layer::Overlay(section));
        info!(bytes = bytes.len(), changed = changes.len(), "Configuration loaded from stream");
        Ok(())
    }

    pub async fn load_remote(&self, url: &Url) -> Result<()> {
        self.load_remote_with_timeout(url, self.inner.remote.timeout).await
    }

    /// Fetch, decode and merge `url`. On timeout, failure or cancellation
    /// the store is unchanged.
    pub async fn load_remote_with_timeout(&self, url: &Url, timeout: Duration) -> Result<()> {
        let bytes = remote::fetch(&self.inner.http, url, timeout).await?;
        let section = self.decoder().decode(&bytes)?;

        let _gate = self.inner.write_gate.lock().await;
        let changes = self.inner.store.merge(section.clone(), self.inner.policy)?;
        self.record_layer(Layer::Remote {
            url: url.clone(),
            cached: section,
        });
        self.inner.sources.update(|s| {
            s.url = Some(url.clone());
            s.last = LastSource::Remote(url.clone());
        });
        info!(url = %url, changed = changes.len(), "Configuration loaded from remote");
        Ok(())
    }

    /// Encode the store and write it to `path` atomically.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        let bytes = self.encode_snapshot()?;
        let len = bytes.len();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
            .await
            .map_err(|e| ConfigError::io(path.display(), e))??;
        info!(path = ?path, bytes = len, "Configuration saved");
        Ok(())
    }

    pub async fn save_stream<W: AsyncWrite + Unpin>(&self, mut writer: W) -> Result<()> {
        let bytes = self.encode_snapshot()?;
        writer
            .write_all(&bytes)
            .await
            .map_err(|e| ConfigError::io("stream", e))?;
        writer.flush().await.map_err(|e| ConfigError::io("stream", e))?;
        Ok(())
    }

    pub async fn save_remote(&self, url: &Url) -> Result<()> {
        self.save_remote_with_timeout(url, self.inner.remote.timeout).await
    }

    pub async fn save_remote_with_timeout(&self, url: &Url, timeout: Duration) -> Result<()> {
        let bytes = self.encode_snapshot()?;
        remote::upload(&self.inner.http, url, bytes, timeout).await?;
        info!(url = %url, "Configuration saved to remote");
        Ok(())
    }

    /// Deep-merge another manager's store into this one.
    pub async fn merge(&self, other: &FileConfigManager) -> Result<()> {
        self.merge_store(other.store()).await
    }

    pub async fn merge_store(&self, other: &ConfigStore) -> Result<()> {
        let overlay = other.snapshot();
        let _gate = self.inner.write_gate.lock().await;
        let changes = self.inner.store.merge(overlay.clone(), self.inner.policy)?;
        self.record_layer(Layer::Overlay(overlay));
        if !changes.is_empty() {
            info!("Configuration merged: {:?}", changes);
        }
        Ok(())
    }

    /// Persist `set` mutations to the backing medium. No-op when clean.
    pub async fn sync(&self) -> Result<()> {
        if !self.inner.store.take_dirty() {
            return Ok(());
        }

        let result = match (self.file_path(), self.inner.sources.last_source()) {
            (_, LastSource::Remote(url)) => self.save_remote(&url).await,
            (Some(path), _) => self.save(&path).await,
            (None, _) => Err(ConfigError::io("sync", "no backing file or URL")),
        };

        if result.is_err() {
            self.inner.store.mark_dirty();
        }
        result
    }

    /// Replay every recorded source when the strategy says so (always, when
    /// there is no strategy). Returns whether a reload happened.
    pub async fn reload(&self) -> Result<bool> {
        self.reload_with(true).await
    }

    async fn reload_with(&self, refresh_remote: bool) -> Result<bool> {
        let mut strategy = self.inner.strategy.lock().await;
        match strategy.as_mut() {
            Some(strategy) => {
                if !strategy.need_reloading().await? {
                    return Ok(false);
                }
                let reloaded = self.reload_sources(refresh_remote).await?;
                strategy.reloading_performed().await?;
                Ok(reloaded)
            }
            None => self.reload_sources(refresh_remote).await,
        }
    }

    async fn reload_sources(&self, refresh_remote: bool) -> Result<bool> {
        let _gate = self.inner.write_gate.lock().await;
        let layers = self.inner.layers.read().clone();
        if layers.is_empty() {
            debug!("Nothing loaded yet, skipping reload");
            return Ok(false);
        }

        let mut sections = Vec::with_capacity(layers.len());
        let mut refreshed = Vec::with_capacity(layers.len());
        for layer in layers {
            match layer {
                Layer::Files(paths) => {
                    sections.push(self.decode_paths(&paths).await?);
                    refreshed.push(Layer::Files(paths));
                }
                Layer::Remote { url, cached } => {
                    let section = if refresh_remote {
                        let bytes = remote::fetch(&self.inner.http, &url, self.inner.remote.timeout).await?;
                        self.decoder().decode(&bytes)?
                    } else {
                        cached
                    };
                    sections.push(section.clone());
                    refreshed.push(Layer::Remote { url, cached: section });
                }
                Layer::Overlay(section) => {
                    sections.push(section.clone());
                    refreshed.push(Layer::Overlay(section));
                }
            }
        }
        let rebuilt = merge_all(self.inner.policy, sections);

        if self.inner.store.is_dirty() {
            info!("Reload applied over unsynced changes; keys defined by sources take the reloaded value");
            self.inner.store.merge(rebuilt, MergePolicy::LaterOverrides)?;
        } else {
            self.inner.store.replace(rebuilt)?;
        }
        *self.inner.layers.write() = refreshed;
        info!("Configuration reloaded");
        Ok(true)
    }

    fn record_layer(&self, layer: Layer) {
        let mut layers = self.inner.layers.write();
        layers.retain(|existing| !existing.same_origin(&layer));
        layers.push(layer);
    }

    /// Start background change detection for `paths` (plus the loaded ones).
    ///
    /// Without a reloading strategy this does nothing and succeeds. Calling
    /// it again replaces the running watch.
    pub async fn watch<P: AsRef<Path>>(&self, paths: &[P]) -> Result<()> {
        if !self.has_reload_strategy().await {
            debug!("No reloading strategy, watch is a no-op");
            return Ok(());
        }

        let added: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
        self.inner.sources.update(|s| {
            for path in added {
                if !s.watched.contains(&path) {
                    s.watched.push(path);
                }
            }
        });

        // Held until the new handle is stored so overlapping calls cannot orphan a task.
        let mut slot = self.inner.watcher.lock().await;
        if let Some(previous) = slot.take() {
            previous.stop().await;
        }

        let tracked = self.inner.sources.tracked_paths();
        let weak = Arc::downgrade(&self.inner);
        let handle = watch::spawn_watch(tracked, self.inner.watch_options.clone(), move |wake| {
            let weak = Weak::clone(&weak);
            async move {
                match weak.upgrade() {
                    Some(inner) => {
                        FileConfigManager { inner }.reload_in_background(wake).await;
                        true
                    }
                    None => false,
                }
            }
        });
        *slot = Some(handle);
        Ok(())
    }

    /// Stop the background watch. No reload fires after this returns.
    pub async fn unwatch(&self) {
        let handle = self.inner.watcher.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    pub async fn is_watching(&self) -> bool {
        self.inner
            .watcher
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    async fn reload_in_background(&self, wake: WatchWake) {
        let refresh_remote = self.inner.env.allows_remote_watch();
        if !refresh_remote {
            let remote_only = {
                let layers = self.inner.layers.read();
                !layers.is_empty() && layers.iter().all(|l| matches!(l, Layer::Remote { .. }))
            };
            if remote_only {
                debug!(env = %self.inner.env.kind(), "Remote reload disabled in this environment");
                return;
            }
        }
        match self.reload_with(refresh_remote).await {
            Ok(true) => debug!(wake = ?wake, "Background reload applied"),
            Ok(false) => {}
            Err(e) => error!(wake = ?wake, "Background reload failed, will retry: {}", e),
        }
    }

    async fn decode_paths(&self, paths: &[PathBuf]) -> Result<Section> {
        let decoder = self.decoder();
        let mut decoded = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| ConfigError::io(path.display(), e))?;
            let section = decoder.decode(&bytes).map_err(|e| match e {
                ConfigError::DecodeError { reason } => {
                    ConfigError::decode(format!("{}: {}", path.display(), reason))
                }
                other => other,
            })?;
            decoded.push(section);
        }
        Ok(merge_all(self.inner.policy, decoded))
    }

    fn encode_snapshot(&self) -> Result<Vec<u8>> {
        let snapshot = self.inner.store.snapshot();
        self.encoder().encode(&snapshot)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| ConfigError::io(path.display(), e))?;
    file.write_all(bytes)
        .and_then(|()| file.as_file().sync_all())
        .map_err(|e| ConfigError::io(path.display(), e))?;
    file.persist(path)
        .map_err(|e| ConfigError::io(path.display(), e.error))?;
    Ok(())
}

impl Configurable for FileConfigManager {
    fn contains_key(&self, key: &str) -> bool {
        self.inner.store.contains_key(key)
    }

    fn get(&self, key: &str) -> Result<Field> {
        self.inner.store.get(key)
    }

    fn set_value(&self, key: &str, value: Value) -> Result<()> {
        self.inner.store.set_value(key, value)
    }

    fn get_section(&self, key: &str) -> Result<ConfigStore> {
        self.inner.store.get_section(key)
    }

    fn keys(&self) -> Vec<String> {
        self.inner.store.keys()
    }
}
