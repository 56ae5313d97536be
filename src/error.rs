//! Error types for the workflow orchestrator.

use crate::graph::WorkflowState;
use crate::types::SessionId;
use thiserror::Error;

/// Main error type for orchestrator operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    #[error("Unknown step: {0}")]
    UnknownStep(String),

    #[error("Transition rejected: {from} -> {to}")]
    TransitionRejected {
        from: WorkflowState,
        to: WorkflowState,
    },

    #[error("Unknown data key: {0}")]
    UnknownDataKey(String),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Invalid session id: {0:?}")]
    InvalidSessionId(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(e: serde_json::Error) -> Self {
        OrchestratorError::Serialization(e.to_string())
    }
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
