//! Error taxonomy shared by every nap crate.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Implementation-independent classification of controller failures.
///
/// Each crate's error enum exposes a `kind()` that maps onto this set, so the
/// command layer can decide on exit behaviour and remediation hints without
/// matching on every concrete variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Precondition,
    Busy,
    Engine,
    HealthTimeout,
    Io,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Precondition => "PRECONDITION",
            ErrorKind::Busy => "BUSY",
            ErrorKind::Engine => "ENGINE",
            ErrorKind::HealthTimeout => "HEALTH_TIMEOUT",
            ErrorKind::Io => "IO",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while validating input or handling configuration files.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("random source unavailable: {0}")]
    Entropy(String),

    #[error("cannot determine home directory; set NAP_HOME")]
    NoHome,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) | CoreError::Parse { .. } => ErrorKind::Validation,
            CoreError::Io { .. } | CoreError::NoHome => ErrorKind::Io,
            CoreError::Serialize(_) | CoreError::Entropy(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoreError::Io {
            path: path.into(),
            source,
        }
    }
}
