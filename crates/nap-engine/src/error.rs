//! Engine adapter error types.

use std::path::PathBuf;
use std::time::Duration;

use nap_core::ErrorKind;
use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no container runtime detected (tried {tried}); install docker or podman")]
    NoRuntime { tried: String },

    #[error("failed to connect to engine socket {socket}: {source}")]
    Connect {
        socket: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("engine http error: {0}")]
    Http(#[from] hyper::Error),

    #[error("invalid engine request: {0}")]
    Request(#[from] http::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("engine returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("{op} timed out after {}s", .after.as_secs())]
    Timeout { op: &'static str, after: Duration },

    #[error("failed to decode engine response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Stream(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Io(_) => ErrorKind::Io,
            _ => ErrorKind::Engine,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}
