use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CaptureId, Message, RoleId, SessionId};

/// Events a session publishes for display collaborators.
///
/// Consumed by:
/// - The SSE stream (live transcript, typing dots, recording indicator)
/// - Session history views that refresh on commit
///
/// Collaborators only observe; they never write back into a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionEvent {
    /// A message was appended to the transcript.
    MessageCommitted {
        session_id: SessionId,
        message: Message,
    },

    /// The assistant started or stopped "typing" (a responder call is outstanding).
    TypingChanged { session_id: SessionId, typing: bool },

    /// Voice capture started or stopped.
    RecordingChanged {
        session_id: SessionId,
        capture_id: CaptureId,
        recording: bool,
    },

    /// The active role was switched; applies from the next turn.
    RoleChanged {
        session_id: SessionId,
        role: RoleId,
        timestamp: DateTime<Utc>,
    },

    /// The transcript was reset by an explicit new-conversation action.
    TranscriptCleared {
        session_id: SessionId,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Session this event belongs to.
    pub fn session_id(&self) -> SessionId {
        match self {
            SessionEvent::MessageCommitted { session_id, .. }
            | SessionEvent::TypingChanged { session_id, .. }
            | SessionEvent::RecordingChanged { session_id, .. }
            | SessionEvent::RoleChanged { session_id, .. }
            | SessionEvent::TranscriptCleared { session_id, .. } => *session_id,
        }
    }

    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::MessageCommitted { .. } => "message_committed",
            SessionEvent::TypingChanged { .. } => "typing_changed",
            SessionEvent::RecordingChanged { .. } => "recording_changed",
            SessionEvent::RoleChanged { .. } => "role_changed",
            SessionEvent::TranscriptCleared { .. } => "transcript_cleared",
        }
    }
}
