//! Control-plane error types.

use nap_core::{CoreError, ErrorKind};
use nap_engine::EngineError;
use nap_proxy::ProxyError;
use nap_rollout::DeployError;
use nap_state::StateError;
use thiserror::Error;

pub type ControlResult<T> = Result<T, ControlError>;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    /// The operation does not apply to the entity's current state.
    /// `hints` are remediation commands shown under the error.
    #[error("{message}")]
    Precondition { message: String, hints: Vec<String> },

    #[error("no free subnet left in 172.20.0.0/16 .. 172.254.0.0/16")]
    NoSubnetAvailable,

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ControlError {
    pub fn precondition(message: impl Into<String>) -> Self {
        ControlError::Precondition {
            message: message.into(),
            hints: Vec::new(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ControlError::Validation(_) => ErrorKind::Validation,
            ControlError::Conflict(_) => ErrorKind::Conflict,
            ControlError::NotFound(_) => ErrorKind::NotFound,
            ControlError::Precondition { .. } | ControlError::NoSubnetAvailable => ErrorKind::Precondition,
            ControlError::State(e) => e.kind(),
            ControlError::Engine(e) => e.kind(),
            ControlError::Deploy(e) => e.kind(),
            ControlError::Proxy(e) => e.kind(),
            ControlError::Core(e) => e.kind(),
        }
    }

    /// Follow-up lines printed under the error message.
    pub fn hints(&self) -> Vec<String> {
        match self {
            ControlError::Precondition { hints, .. } => hints.clone(),
            ControlError::State(StateError::Busy(_)) => vec![
                "wait for the running command to finish and retry".to_string(),
                "if no nap command is running, 'nap doctor' lists stale locks".to_string(),
            ],
            ControlError::Engine(EngineError::Connect { .. }) | ControlError::Engine(EngineError::NoRuntime { .. }) => {
                vec!["check the container engine with 'nap daemon status'".to_string()]
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_maps_to_busy_with_hints() {
        let err = ControlError::from(StateError::Busy("web".into()));
        assert_eq!(err.kind(), ErrorKind::Busy);
        assert_eq!(err.to_string(), "another operation in progress for web");
        assert_eq!(err.hints().len(), 2);
    }

    #[test]
    fn precondition_carries_hints() {
        let err = ControlError::Precondition {
            message: "different VPCs".into(),
            hints: vec!["nap app deploy api --vpc primary".into()],
        };
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert_eq!(err.hints(), vec!["nap app deploy api --vpc primary".to_string()]);
    }
}
