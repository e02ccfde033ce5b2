//! # Configuration Errors
//!
//! Error taxonomy for the configuration layer.
//!
//! - Uses `thiserror` for structured error definitions
//! - Lookup errors (`KeyNotFound`) are kept apart from shape errors
//!   (`TypeMismatch`) so callers can choose between a default fallback and a
//!   hard failure
//! - Classification never fails, so there is no "classify" variant

use thiserror::Error;

/// Errors produced by stores, codecs, managers and reloading strategies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Key not found: {key}")]
    KeyNotFound { key: String },

    #[error("Type mismatch for {key}: expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: String,
        found: String,
    },

    #[error("Unsupported type: {type_name}")]
    UnsupportedType { type_name: String },

    #[error("Decode error: {reason}")]
    DecodeError { reason: String },

    #[error("Encode error: {reason}")]
    EncodeError { reason: String },

    #[error("IO error on {target}: {reason}")]
    IoError { target: String, reason: String },

    #[error("Reloading strategy error: {reason}")]
    StrategyError { reason: String },
}

/// Result alias used across the configuration crates.
pub type Result<T> = std::result::Result<T, ConfigError>;

impl ConfigError {
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    pub fn type_mismatch(
        key: impl Into<String>,
        expected: impl ToString,
        found: impl ToString,
    ) -> Self {
        Self::TypeMismatch {
            key: key.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub fn unsupported(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }

    pub fn decode(reason: impl ToString) -> Self {
        Self::DecodeError {
            reason: reason.to_string(),
        }
    }

    pub fn encode(reason: impl ToString) -> Self {
        Self::EncodeError {
            reason: reason.to_string(),
        }
    }

    pub fn io(target: impl ToString, reason: impl ToString) -> Self {
        Self::IoError {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn strategy(reason: impl ToString) -> Self {
        Self::StrategyError {
            reason: reason.to_string(),
        }
    }

    /// True when the error means "absent", i.e. a default may be substituted.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }

    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. })
    }

    pub fn is_io(&self) -> bool {
        matches!(self, Self::IoError { .. })
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError {
            target: format!("{:?}", err.kind()),
            reason: err.to_string(),
        }
    }
}

/// Extension for `Result<T>` returned by typed getters.
pub trait OptionalExt<T> {
    /// Maps `KeyNotFound` to `Ok(None)` and keeps every other error.
    fn optional(self) -> Result<Option<T>>;

    /// Maps `KeyNotFound` to `Ok(default)` and keeps every other error.
    fn or_default_value(self, default: T) -> Result<T>;
}

impl<T> OptionalExt<T> for Result<T> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn or_default_value(self, default: T) -> Result<T> {
        self.optional().map(|value| value.unwrap_or(default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            ConfigError::key_not_found("db.host").to_string(),
            "Key not found: db.host"
        );
        assert_eq!(
            ConfigError::type_mismatch("port", "int", "string").to_string(),
            "Type mismatch for port: expected int, found string"
        );
        assert_eq!(
            ConfigError::io("/etc/app.json", "permission denied").to_string(),
            "IO error on /etc/app.json: permission denied"
        );
    }

    #[test]
    fn test_predicates() {
        assert!(ConfigError::key_not_found("a").is_not_found());
        assert!(!ConfigError::key_not_found("a").is_type_mismatch());
        assert!(ConfigError::type_mismatch("a", "bool", "string").is_type_mismatch());
        assert!(ConfigError::io("x", "y").is_io());
    }

    #[test]
    fn test_from_io_error() {
        let err: ConfigError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing file").into();
        assert!(err.is_io());
        assert!(err.to_string().contains("missing file"));
    }

    #[test]
    fn test_optional_fallback() {
        let missing: Result<i64> = Err(ConfigError::key_not_found("port"));
        assert_eq!(missing.optional().unwrap(), None);

        let missing: Result<i64> = Err(ConfigError::key_not_found("port"));
        assert_eq!(missing.or_default_value(8080).unwrap(), 8080);

        let mismatch: Result<i64> = Err(ConfigError::type_mismatch("port", "int", "string"));
        assert!(mismatch.or_default_value(8080).is_err());
    }
}
