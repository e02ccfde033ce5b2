//! # Configer
//!
//! Typed configuration storage with pluggable encodings and reloadable
//! sources.
//!
//! This crate provides:
//! - A closed field model that classifies native values into tagged kinds
//! - An in-memory store with typed getters and nested sections
//! - Encoder/decoder contracts for plugging in serialization formats
//! - A file/stream/remote manager with merge, save, sync and reload
//! - Reloading strategies and a background watch with explicit stop

pub mod codec;
pub mod field;
pub mod manager;
pub mod merge;
pub mod registry;
pub mod remote;
pub mod section;
pub mod store;
pub mod strategy;
pub mod watch;

pub use codec::{CodecPair, ConfigCodec, ConfigDecoder, ConfigEncoder};
pub use field::{Field, FloatWidth, IntWidth, Kind, Value, classify};
pub use manager::{FileConfigManager, FileConfigManagerBuilder};
pub use merge::{MergePolicy, merge_all};
pub use registry::ExtensionRegistry;
pub use remote::RemoteOptions;
pub use section::Section;
pub use store::{ConfigStore, Configurable, DEFAULT_DELIMITER};
pub use strategy::{
    FileChangedStrategy, LastSource, ManualStrategy, PeriodicStrategy, ReloadTrigger,
    ReloadingStrategy, SourceView,
};
pub use watch::{WatchHandle, WatchOptions, WatchWake};

pub use environment::{EnvInfo, EnvKind};
pub use errors::{ConfigError, OptionalExt, Result};
