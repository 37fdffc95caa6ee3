//! Conversational query sessions for AquaMind.
//!
//! Turns typed or spoken input into queries, runs them against a pluggable
//! responder under the user's selected role, and keeps an append-only
//! transcript per session.

pub mod engine;
pub mod error;
pub mod input;
pub mod manager;
pub mod record;
pub mod responder;
pub mod roles;
pub mod state;
pub mod transcript;
pub mod voice;

pub use engine::{
    failure_notice, SessionEngine, SessionEngineBuilder, SessionStats, TurnOutcome,
    CANCELLED_NOTICE,
};
pub use error::{ChatError, ResponderError};
pub use input::{InputCapture, InputSource, NormalizedQuery};
pub use manager::{SessionManager, SessionSummary};
pub use record::SessionRecord;
pub use responder::{Answer, CannedAnswer, CannedResponder, Responder, SelectionStrategy};
pub use roles::{RoleProfile, RoleRegistry, QUICK_PROMPTS};
pub use state::{TurnState, TurnStateMachine};
pub use transcript::{MessageDraft, TranscriptSnapshot, TranscriptStore};
pub use voice::{CaptureHandle, CaptureState, ScriptedRecognizer, SpeechRecognizer, VoiceCapture};
