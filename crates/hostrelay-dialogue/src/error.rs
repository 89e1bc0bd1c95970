//! Error types for the dialogue engine.

use hostrelay_core::error::RelayError;
use hostrelay_core::types::UserId;

use crate::workflow::{Stage, WorkflowKind};

/// Errors from session management and stage transitions.
#[derive(Debug, thiserror::Error)]
pub enum DialogueError {
    /// Text arrived for a workflow the user has not entered (or that has
    /// already ended). Callers route the text to the fallback handler.
    #[error("no active session for user {user}")]
    NoActiveSession {
        user: UserId,
        kind: Option<WorkflowKind>,
    },
    #[error("{kind} session already active for user {user}")]
    SessionActive { user: UserId, kind: WorkflowKind },
    #[error("Invalid stage transition: {0} -> {1}")]
    InvalidTransition(Stage, Stage),
    #[error("inconsistent session state: {0}")]
    InvalidState(String),
    #[error("registry error: {0}")]
    Registry(String),
    #[error("Storage error: {0}")]
    Storage(#[from] RelayError),
}
