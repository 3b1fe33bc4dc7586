//! Health gate error types.

use std::time::Duration;

use nap_core::ErrorKind;
use nap_engine::EngineError;
use thiserror::Error;

pub type HealthResult<T> = Result<T, HealthError>;

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("health check for {container} timed out after {}s", .after.as_secs())]
    Timeout { container: String, after: Duration },

    #[error("container {container} exited with code {exit_code} before becoming healthy")]
    Exited { container: String, exit_code: i64 },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl HealthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HealthError::Timeout { .. } | HealthError::Exited { .. } => ErrorKind::HealthTimeout,
            HealthError::Engine(e) => e.kind(),
        }
    }
}
