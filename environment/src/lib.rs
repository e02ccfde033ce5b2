//! # Process Environment
//!
//! Read-only classification of the process environment (local, dev, test,
//! prod, ...) plus the application root directory.
//!
//! The value is computed once, by the caller, and handed to whoever needs it.
//! Nothing here is global or mutable after construction.
//!
//! # Environment Variables
//! - `DEV_UP_ENV_MODE`: numeric code (`0`..`6`) or name (`local`, `dev`,
//!   `test`, `prod`, `docker`, `k8s`). Unset means `unknown`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Variable consulted by [`EnvInfo::from_process`].
pub const ENV_MODE_VAR: &str = "DEV_UP_ENV_MODE";

#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("Invalid environment mode: {value}")]
    InvalidMode { value: String },

    #[error("Cannot resolve application root: {reason}")]
    AppRoot { reason: String },
}

/// Deployment environment the process runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvKind {
    #[default]
    Unknown,
    Local,
    Dev,
    Test,
    Prod,
    Docker,
    K8s,
}

impl EnvKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Local => "local",
            Self::Dev => "dev",
            Self::Test => "test",
            Self::Prod => "prod",
            Self::Docker => "docker",
            Self::K8s => "k8s",
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Unknown,
            1 => Self::Local,
            2 => Self::Dev,
            3 => Self::Test,
            4 => Self::Prod,
            5 => Self::Docker,
            6 => Self::K8s,
            _ => return None,
        })
    }
}

impl fmt::Display for EnvKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvKind {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<u8>() {
            return Self::from_code(code).ok_or_else(|| EnvError::InvalidMode {
                value: s.to_string(),
            });
        }
        match trimmed.to_lowercase().as_str() {
            "" | "unknown" => Ok(Self::Unknown),
            "local" => Ok(Self::Local),
            "dev" | "development" => Ok(Self::Dev),
            "test" => Ok(Self::Test),
            "prod" | "production" => Ok(Self::Prod),
            "docker" => Ok(Self::Docker),
            "k8s" | "kubernetes" => Ok(Self::K8s),
            _ => Err(EnvError::InvalidMode {
                value: s.to_string(),
            }),
        }
    }
}

/// Immutable environment information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvInfo {
    kind: EnvKind,
    app_root: PathBuf,
}

impl EnvInfo {
    pub fn new(kind: EnvKind, app_root: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            app_root: app_root.into(),
        }
    }

    /// Derive the environment from process state.
    ///
    /// The application root is the directory of the running executable. When
    /// that directory lies under the system temp dir (test binaries, `cargo
    /// run` scratch builds) the working directory is used instead and the
    /// environment is forced to [`EnvKind::Local`].
    pub fn from_process() -> Result<Self, EnvError> {
        let mut kind = match std::env::var(ENV_MODE_VAR) {
            Ok(value) => value.parse()?,
            Err(_) => EnvKind::Unknown,
        };

        let exe_dir = executable_dir()?;
        let temp_dir = std::env::temp_dir()
            .canonicalize()
            .unwrap_or_else(|_| std::env::temp_dir());

        let app_root = if exe_dir.starts_with(&temp_dir) {
            kind = EnvKind::Local;
            std::env::current_dir().map_err(|e| EnvError::AppRoot {
                reason: e.to_string(),
            })?
        } else {
            exe_dir
        };

        debug!(env = %kind, app_root = ?app_root, "Resolved process environment");
        Ok(Self { kind, app_root })
    }

    pub fn kind(&self) -> EnvKind {
        self.kind
    }

    pub fn app_root(&self) -> &Path {
        &self.app_root
    }

    pub fn is_local(&self) -> bool {
        self.kind == EnvKind::Local
    }

    pub fn is_dev(&self) -> bool {
        self.kind == EnvKind::Dev
    }

    pub fn is_test(&self) -> bool {
        self.kind == EnvKind::Test
    }

    pub fn is_prod(&self) -> bool {
        self.kind == EnvKind::Prod
    }

    pub fn is_docker(&self) -> bool {
        self.kind == EnvKind::Docker
    }

    pub fn is_k8s(&self) -> bool {
        self.kind == EnvKind::K8s
    }

    /// Remote sources are not polled from developer machines or test runs.
    pub fn allows_remote_watch(&self) -> bool {
        !matches!(self.kind, EnvKind::Local | EnvKind::Test)
    }
}

impl Default for EnvInfo {
    fn default() -> Self {
        Self {
            kind: EnvKind::Unknown,
            app_root: PathBuf::from("."),
        }
    }
}

fn executable_dir() -> Result<PathBuf, EnvError> {
    let exe = std::env::current_exe().map_err(|e| EnvError::AppRoot {
        reason: e.to_string(),
    })?;
    let exe = exe.canonicalize().unwrap_or(exe);
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| EnvError::AppRoot {
            reason: format!("executable {} has no parent directory", exe.display()),
        })
}
