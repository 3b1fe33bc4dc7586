//! Proxy integration error types.

use std::path::PathBuf;

use nap_core::{CoreError, ErrorKind};
use nap_engine::EngineError;
use thiserror::Error;

pub type ProxyResult<T> = Result<T, ProxyError>;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to prepare proxy directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("proxy: {0}")]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ProxyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::Io { .. } => ErrorKind::Io,
            ProxyError::Engine(e) => e.kind(),
            ProxyError::Core(e) => e.kind(),
        }
    }
}
