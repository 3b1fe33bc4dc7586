//! Error types for the registry layer.

use std::path::PathBuf;

use nap_core::{CoreError, ErrorKind};
use thiserror::Error;

/// Result type alias for registry operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while reading, writing, or locking registry state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("registry {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} '{name}' already exists")]
    Conflict { kind: &'static str, name: String },

    #[error("another operation in progress for {0}")]
    Busy(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StateError::Io { .. } | StateError::Corrupt { .. } => ErrorKind::Io,
            StateError::Serialize(_) => ErrorKind::Internal,
            StateError::NotFound { .. } => ErrorKind::NotFound,
            StateError::Conflict { .. } => ErrorKind::Conflict,
            StateError::Busy(_) => ErrorKind::Busy,
            StateError::Core(e) => e.kind(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StateError::Io {
            path: path.into(),
            source,
        }
    }
}
