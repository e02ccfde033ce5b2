//! # Configuration Codecs
//!
//! Encode/decode contract between a [`Section`] and a serialized format.
//! Concrete formats live outside this crate and are plugged in through a
//! [`FileConfigManager`](crate::FileConfigManager) or the
//! [`ExtensionRegistry`](crate::ExtensionRegistry).
//!
//! Implementations must be deterministic for a fixed key order and must
//! report malformed input as [`ConfigError::DecodeError`](errors::ConfigError)
//! rather than panic, whatever bytes they are given.

use crate::section::Section;
use errors::Result;
use std::fmt;
use std::sync::Arc;

/// Serializes a configuration tree.
pub trait ConfigEncoder: Send + Sync {
    fn encode(&self, fields: &Section) -> Result<Vec<u8>>;
}

/// Parses a configuration tree.
pub trait ConfigDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<Section>;
}

/// A paired encoder and decoder for one format.
pub trait ConfigCodec: ConfigEncoder + ConfigDecoder {}

impl<T: ConfigEncoder + ConfigDecoder + ?Sized> ConfigCodec for T {}

/// Encoder and decoder handles as held by a manager.
#[derive(Clone)]
pub struct CodecPair {
    pub encoder: Arc<dyn ConfigEncoder>,
    pub decoder: Arc<dyn ConfigDecoder>,
}

impl CodecPair {
    pub fn new<C: ConfigCodec + 'static>(codec: C) -> Self {
        let codec = Arc::new(codec);
        Self {
            encoder: codec.clone(),
            decoder: codec,
        }
    }

    pub fn split(encoder: Arc<dyn ConfigEncoder>, decoder: Arc<dyn ConfigDecoder>) -> Self {
        Self { encoder, decoder }
    }
}

impl fmt::Debug for CodecPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecPair").finish_non_exhaustive()
    }
}
