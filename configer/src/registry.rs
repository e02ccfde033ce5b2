//! # Extension Registry
//!
//! Startup-time lookup of codecs and reloading strategies by name.
//!
//! Extensions (whatever loads them) register factories here once, before any
//! manager is built; managers then ask for a codec by name or by file
//! extension. Nothing is loaded implicitly.

use crate::codec::{CodecPair, ConfigCodec};
use crate::strategy::ReloadingStrategy;
use errors::{ConfigError, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

type CodecFactory = Arc<dyn Fn() -> CodecPair + Send + Sync>;
type StrategyFactory = Arc<dyn Fn() -> Box<dyn ReloadingStrategy> + Send + Sync>;

#[derive(Default)]
pub struct ExtensionRegistry {
    codecs: HashMap<String, CodecFactory>,
    extensions: HashMap<String, String>,
    strategies: HashMap<String, StrategyFactory>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a codec under `name`, reachable also through each of the
    /// given file extensions (without the dot, case-insensitive).
    ///
    /// Registering a name twice replaces the earlier factory.
    pub fn register_codec<C, F>(&mut self, name: &str, file_extensions: &[&str], factory: F)
    where
        C: ConfigCodec + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        let name = name.to_lowercase();
        if self.codecs.contains_key(&name) {
            warn!(codec = %name, "Replacing previously registered codec");
        }
        self.codecs
            .insert(name.clone(), Arc::new(move || CodecPair::new(factory())));
        for ext in file_extensions {
            self.extensions
                .insert(ext.trim_start_matches('.').to_lowercase(), name.clone());
        }
        debug!(codec = %name, extensions = ?file_extensions, "Registered codec");
    }

    pub fn register_strategy<S, F>(&mut self, name: &str, factory: F)
    where
        S: ReloadingStrategy + 'static,
        F: Fn() -> S + Send + Sync + 'static,
    {
        let name = name.to_lowercase();
        if self.strategies.contains_key(&name) {
            warn!(strategy = %name, "Replacing previously registered strategy");
        }
        self.strategies
            .insert(name.clone(), Arc::new(move || {
                Box::new(factory()) as Box<dyn ReloadingStrategy>
            }));
        debug!(strategy = %name, "Registered reloading strategy");
    }

    pub fn codec(&self, name: &str) -> Result<CodecPair> {
        self.codecs
            .get(&name.to_lowercase())
            .map(|factory| factory())
            .ok_or_else(|| ConfigError::unsupported(format!("codec '{}'", name)))
    }

    /// Codec registered for the extension of `path`.
    pub fn codec_for_path(&self, path: &Path) -> Result<CodecPair> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::unsupported(format!("file without extension: {}", path.display())))?;
        let name = self
            .extensions
            .get(&ext.to_lowercase())
            .ok_or_else(|| ConfigError::unsupported(format!("file extension '.{}'", ext)))?;
        self.codec(name)
    }

    pub fn strategy(&self, name: &str) -> Result<Box<dyn ReloadingStrategy>> {
        self.strategies
            .get(&name.to_lowercase())
            .map(|factory| factory())
            .ok_or_else(|| ConfigError::unsupported(format!("reloading strategy '{}'", name)))
    }

    pub fn codec_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.codecs.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn strategy_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registry pre-populated with the strategies shipped in this crate:
    /// `file-changed`, `manual`.
    pub fn with_builtin_strategies() -> Self {
        let mut registry = Self::new();
        registry.register_strategy("file-changed", crate::strategy::FileChangedStrategy::default);
        registry.register_strategy("manual", crate::strategy::ManualStrategy::new);
        registry
    }
}
