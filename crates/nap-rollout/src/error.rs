//! Deployment error types.

use nap_core::{CoreError, ErrorKind};
use nap_engine::EngineError;
use nap_health::HealthError;
use thiserror::Error;

pub type DeployResult<T> = Result<T, DeployError>;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Precondition(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("failed to start {container}: {source}")]
    Instance {
        container: String,
        #[source]
        source: EngineError,
    },

    #[error("health check failed for {container}: {source}")]
    Health {
        container: String,
        #[source]
        source: HealthError,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::Validation(_) => ErrorKind::Validation,
            DeployError::Precondition(_) => ErrorKind::Precondition,
            DeployError::NotFound(_) => ErrorKind::NotFound,
            DeployError::Conflict(_) => ErrorKind::Conflict,
            DeployError::Instance { source, .. } => source.kind(),
            DeployError::Health { source, .. } => source.kind(),
            DeployError::Engine(e) => e.kind(),
            DeployError::Core(e) => e.kind(),
        }
    }
}
