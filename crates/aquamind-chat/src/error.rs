//! Error types for the conversational session engine.

use std::time::Duration;

use aquamind_core::error::AquaError;
use aquamind_core::types::{CaptureId, SessionId};

use crate::voice::CaptureState;

/// Failures on the far side of the responder boundary.
///
/// The engine never propagates these to the caller of a turn; they are
/// converted into a visible assistant notice instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponderError {
    #[error("responder transport failed: {0}")]
    Transport(String),
    #[error("responder timed out after {0:?}")]
    Timeout(Duration),
    #[error("responder rejected the query: {0}")]
    Rejected(String),
    #[error("responder produced no answer")]
    NoAnswer,
}

/// Errors from the chat engine.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("input cannot be empty")]
    EmptyInput,
    #[error("input exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("no speech detected")]
    NoSpeechDetected,
    #[error("unknown role: {0}")]
    UnknownRole(String),
    #[error("a turn is already in progress")]
    TurnInProgress,
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error(transparent)]
    Responder(#[from] ResponderError),
    #[error("voice capture is already active")]
    CaptureAlreadyActive,
    #[error("voice capture is not active: {0}")]
    CaptureNotActive(CaptureId),
    #[error("invalid capture transition: {from} -> {to}")]
    InvalidCaptureTransition { from: CaptureState, to: CaptureState },
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
    #[error("invalid role catalog: {0}")]
    InvalidCatalog(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ChatError {
    /// Input-validation errors are rejected before any transcript mutation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ChatError::EmptyInput
                | ChatError::MessageTooLong(_)
                | ChatError::NoSpeechDetected
                | ChatError::UnknownRole(_)
                | ChatError::TurnInProgress
        )
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Serialization(err.to_string())
    }
}

impl From<ChatError> for AquaError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Serialization(msg) => AquaError::Serialization(msg),
            ChatError::InvalidCatalog(msg) => AquaError::Config(msg),
            other => AquaError::Chat(other.to_string()),
        }
    }
}
