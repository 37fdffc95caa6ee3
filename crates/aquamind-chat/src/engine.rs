//! Session engine: turn-taking for one conversation.
//!
//! Flow for one turn:
//! 1. Session must be `Idle`, else `TurnInProgress`.
//! 2. Role resolved through the registry, else `UnknownRole`.
//! 3. User message committed, typing indicator on.
//! 4. Responder called under a timeout.
//! 5. Exactly one assistant message committed: the answer, or a visible
//!    notice when the responder failed.
//! 6. Typing indicator off, back to `Idle`.
//!
//! Steps 1-2 never touch the transcript. Once step 3 succeeds the turn
//! always ends with one assistant message. If the caller drops the future
//! mid-turn, a cancellation notice is committed in its place and the session
//! is released back to `Idle`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use aquamind_core::config::AquaMindConfig;
use aquamind_core::events::SessionEvent;
use aquamind_core::types::{CaptureId, Message, MessageKind, RoleId, Sender, SessionId};

use crate::error::{ChatError, ResponderError};
use crate::input::{InputCapture, NormalizedQuery, DEFAULT_MAX_QUERY_LENGTH};
use crate::record::SessionRecord;
use crate::responder::Responder;
use crate::roles::{RoleProfile, RoleRegistry};
use crate::state::{TurnGuard, TurnState, TurnStateMachine};
use crate::transcript::{MessageDraft, TranscriptSnapshot, TranscriptStore};
use crate::voice::{CaptureHandle, ScriptedRecognizer, SpeechRecognizer, VoiceCapture};

/// Default upper bound on one responder call.
pub const DEFAULT_RESPONDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum voice capture length.
pub const DEFAULT_VOICE_MAX_DURATION: Duration = Duration::from_secs(30);

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Result of one completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub user_message: Message,
    pub reply: Message,
    /// Role the turn was answered under.
    pub role: RoleId,
    /// Set when the reply is a failure notice rather than an answer.
    pub failure: Option<ResponderError>,
}

impl TurnOutcome {
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// Numbers behind the "Session Stats" card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub message_count: usize,
    pub turn_count: u64,
    pub failed_turns: u64,
    /// Assistant messages that reference a chart or map.
    pub visualizations: usize,
    pub active_role: RoleId,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: i64,
}

/// Visible assistant notice for a failed responder call.
pub fn failure_notice(err: &ResponderError) -> String {
    match err {
        ResponderError::Timeout(_) => {
            "Sorry, the ocean data service took too long to answer. Please try again.".to_string()
        }
        ResponderError::Transport(_) => {
            "Sorry, I couldn't reach the ocean data service. Please try again.".to_string()
        }
        ResponderError::Rejected(reason) => format!("Sorry, I can't answer that: {reason}"),
        ResponderError::NoAnswer => {
            "Sorry, I don't have an answer for that yet. Try one of the suggested prompts."
                .to_string()
        }
    }
}

#[derive(Debug)]
struct Activity {
    turns: u64,
    failed_turns: u64,
    last_activity: DateTime<Utc>,
}

/// One conversation: transcript, active role, turn state and voice input.
pub struct SessionEngine {
    id: SessionId,
    started_at: DateTime<Utc>,
    transcript: TranscriptStore,
    registry: Arc<RoleRegistry>,
    responder: Arc<dyn Responder>,
    input: InputCapture,
    voice: VoiceCapture,
    turns: TurnStateMachine,
    active_role: Mutex<RoleId>,
    timeout: Duration,
    events: broadcast::Sender<SessionEvent>,
    activity: Mutex<Activity>,
}

impl std::fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEngine")
            .field("id", &self.id)
            .field("active_role", &self.active_role())
            .field("state", &self.turns.current())
            .field("messages", &self.transcript.len())
            .finish()
    }
}

/// Assistant notice committed when a turn is abandoned before its reply.
pub const CANCELLED_NOTICE: &str = "Response cancelled. Ask again whenever you're ready.";

/// Releases the turn and clears the typing indicator, also when the turn's
/// future is dropped midway. A dropped turn still gets its assistant message.
struct PendingTurn<'a> {
    engine: &'a SessionEngine,
    completed: bool,
    _guard: TurnGuard<'a>,
}

impl<'a> PendingTurn<'a> {
    fn start(engine: &'a SessionEngine, guard: TurnGuard<'a>) -> Self {
        engine.emit(SessionEvent::TypingChanged {
            session_id: engine.id,
            typing: true,
        });
        Self {
            engine,
            completed: false,
            _guard: guard,
        }
    }

    fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for PendingTurn<'_> {
    fn drop(&mut self) {
        if !self.completed {
            // Runs before `_guard` is dropped, so no other turn can slip in.
            let draft = MessageDraft::assistant(CANCELLED_NOTICE, MessageKind::Text);
            match self.engine.commit(draft) {
                Ok(_) => {
                    let mut activity = self.engine.activity();
                    activity.turns += 1;
                    activity.failed_turns += 1;
                }
                Err(err) => tracing::error!(
                    session_id = %self.engine.id,
                    error = %err,
                    "Failed to commit cancellation notice"
                ),
            }
            tracing::warn!(session_id = %self.engine.id, "Turn abandoned before reply");
        }
        self.engine.emit(SessionEvent::TypingChanged {
            session_id: self.engine.id,
            typing: false,
        });
    }
}

impl SessionEngine {
    pub fn builder(
        registry: Arc<RoleRegistry>,
        responder: Arc<dyn Responder>,
    ) -> SessionEngineBuilder {
        SessionEngineBuilder::new(registry, responder)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn registry(&self) -> &RoleRegistry {
        &self.registry
    }

    pub fn input(&self) -> InputCapture {
        self.input
    }

    // -------------------------------------------------------------------------
    // Turns
    // -------------------------------------------------------------------------

    /// Validate raw typed text and run a turn under the active role.
    pub async fn send(&self, raw: &str) -> Result<TurnOutcome, ChatError> {
        let query = self.input.submit_text(raw)?;
        self.submit_turn(query).await
    }

    /// Run a turn under the active role.
    pub async fn submit_turn(&self, query: NormalizedQuery) -> Result<TurnOutcome, ChatError> {
        let role = self.active_role();
        self.run_turn(query, role).await
    }

    /// Run one turn under `role` without changing the active role.
    pub async fn submit_turn_as(
        &self,
        query: NormalizedQuery,
        role: &str,
    ) -> Result<TurnOutcome, ChatError> {
        self.run_turn(query, RoleId::from(role)).await
    }

    async fn run_turn(
        &self,
        query: NormalizedQuery,
        role_id: RoleId,
    ) -> Result<TurnOutcome, ChatError> {
        if !self.turns.is_idle() {
            return Err(ChatError::TurnInProgress);
        }
        let role = self.registry.get(role_id.as_str())?;
        let guard = self.turns.begin_turn()?;

        let user_message = self.commit(MessageDraft::user(query.as_str()))?;
        let pending = PendingTurn::start(self, guard);

        tracing::debug!(
            session_id = %self.id,
            role = %role.id,
            source = ?query.source(),
            "Dispatching query to responder"
        );
        let result = self.ask(&query, role).await;

        let (draft, failure) = match result {
            Ok(answer) => (MessageDraft::assistant(answer.content, answer.kind), None),
            Err(err) => {
                tracing::warn!(
                    session_id = %self.id,
                    role = %role.id,
                    error = %err,
                    "Responder failed, committing notice"
                );
                (
                    MessageDraft::assistant(failure_notice(&err), MessageKind::Text),
                    Some(err),
                )
            }
        };
        let reply = self.commit(draft)?;

        {
            let mut activity = self.activity();
            activity.turns += 1;
            if failure.is_some() {
                activity.failed_turns += 1;
            }
        }
        pending.complete();

        tracing::info!(
            session_id = %self.id,
            role = %role.id,
            kind = %reply.kind,
            failed = failure.is_some(),
            "Turn committed"
        );

        Ok(TurnOutcome {
            user_message,
            reply,
            role: role.id.clone(),
            failure,
        })
    }

    async fn ask(
        &self,
        query: &NormalizedQuery,
        role: &RoleProfile,
    ) -> Result<crate::responder::Answer, ResponderError> {
        let answer = tokio::time::timeout(self.timeout, self.responder.respond(query, role))
            .await
            .map_err(|_| ResponderError::Timeout(self.timeout))??;

        if answer.content.trim().is_empty() {
            return Err(ResponderError::NoAnswer);
        }
        Ok(answer)
    }

    fn commit(&self, draft: MessageDraft) -> Result<Message, ChatError> {
        let message = self.transcript.append(draft)?;
        self.touch();
        self.emit(SessionEvent::MessageCommitted {
            session_id: self.id,
            message: message.clone(),
        });
        Ok(message)
    }

    // -------------------------------------------------------------------------
    // Roles
    // -------------------------------------------------------------------------

    pub fn active_role(&self) -> RoleId {
        self.active_role
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Switch the role used from the next turn on.
    pub fn set_active_role(&self, id: &str) -> Result<&RoleProfile, ChatError> {
        if !self.turns.is_idle() {
            return Err(ChatError::TurnInProgress);
        }
        let profile = self.registry.get(id)?;
        *self.active_role.lock().unwrap_or_else(PoisonError::into_inner) = profile.id.clone();
        self.touch();

        tracing::info!(session_id = %self.id, role = %profile.id, "Active role switched");
        self.emit(SessionEvent::RoleChanged {
            session_id: self.id,
            role: profile.id.clone(),
            timestamp: Utc::now(),
        });
        Ok(profile)
    }

    // -------------------------------------------------------------------------
    // State & observation
    // -------------------------------------------------------------------------

    /// True while a responder call is outstanding.
    pub fn is_pending(&self) -> bool {
        self.turns.current() == TurnState::AwaitingResponse
    }

    pub fn state(&self) -> TurnState {
        self.turns.current()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<TurnState> {
        self.turns.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> TranscriptSnapshot {
        self.transcript.snapshot()
    }

    /// Start a new conversation in this session.
    pub fn clear(&self) -> Result<(), ChatError> {
        if !self.turns.is_idle() {
            return Err(ChatError::TurnInProgress);
        }
        self.transcript.clear();
        {
            let mut activity = self.activity();
            activity.turns = 0;
            activity.failed_turns = 0;
            activity.last_activity = Utc::now();
        }
        tracing::info!(session_id = %self.id, "Transcript cleared");
        self.emit(SessionEvent::TranscriptCleared {
            session_id: self.id,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.activity().last_activity
    }

    pub fn stats(&self) -> SessionStats {
        let snapshot = self.snapshot();
        let visualizations = snapshot
            .iter()
            .filter(|m| m.is_from(Sender::Assistant) && m.kind.is_visualization())
            .count();
        let activity = self.activity();
        SessionStats {
            message_count: snapshot.len(),
            turn_count: activity.turns,
            failed_turns: activity.failed_turns,
            visualizations,
            active_role: self.active_role(),
            started_at: self.started_at,
            elapsed_secs: (Utc::now() - self.started_at).num_seconds(),
        }
    }

    // -------------------------------------------------------------------------
    // Voice
    // -------------------------------------------------------------------------

    pub fn is_recording(&self) -> bool {
        self.voice.is_recording()
    }

    pub fn begin_voice_capture(&self) -> Result<CaptureHandle, ChatError> {
        let handle = self.voice.begin()?;
        self.touch();
        self.emit(SessionEvent::RecordingChanged {
            session_id: self.id,
            capture_id: handle.id,
            recording: true,
        });
        Ok(handle)
    }

    pub fn push_audio(&self, id: CaptureId, samples: &[f32]) -> Result<(), ChatError> {
        self.voice.push_audio(id, samples)
    }

    /// Stop recording and return the recognized query.
    pub fn end_voice_capture(&self, id: CaptureId) -> Result<NormalizedQuery, ChatError> {
        let was_recording = self.voice.active_id() == Some(id);
        let result = self.voice.end(id);
        if was_recording {
            self.emit(SessionEvent::RecordingChanged {
                session_id: self.id,
                capture_id: id,
                recording: false,
            });
        }
        result
    }

    /// Stop recording and run the recognized query as a turn.
    pub async fn submit_voice_turn(&self, id: CaptureId) -> Result<TurnOutcome, ChatError> {
        let query = self.end_voice_capture(id)?;
        self.submit_turn(query).await
    }

    pub fn cancel_voice_capture(&self, id: CaptureId) -> Result<(), ChatError> {
        self.voice.cancel(id)?;
        self.emit(SessionEvent::RecordingChanged {
            session_id: self.id,
            capture_id: id,
            recording: false,
        });
        Ok(())
    }

    /// Cancel a voice capture left running past its maximum duration.
    pub fn cancel_expired_capture(&self) -> Option<CaptureId> {
        let id = self.voice.cancel_if_expired()?;
        self.emit(SessionEvent::RecordingChanged {
            session_id: self.id,
            capture_id: id,
            recording: false,
        });
        Some(id)
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    pub fn export(&self) -> SessionRecord {
        SessionRecord {
            session_id: self.id,
            active_role: self.active_role(),
            messages: self.snapshot().to_vec(),
        }
    }

    /// Rebuild this session from a record by replaying its messages in order.
    ///
    /// Only allowed on an idle session with an empty transcript.
    pub fn restore(&self, record: &SessionRecord) -> Result<(), ChatError> {
        if !self.turns.is_idle() {
            return Err(ChatError::TurnInProgress);
        }
        if !self.transcript.is_empty() {
            return Err(ChatError::InvalidMessage(
                "cannot restore into a non-empty transcript".to_string(),
            ));
        }
        let role = self.registry.get(record.active_role.as_str())?;

        for message in &record.messages {
            if let Err(err) = self.transcript.append(MessageDraft::from(message.clone())) {
                self.transcript.clear();
                return Err(err);
            }
        }
        *self.active_role.lock().unwrap_or_else(PoisonError::into_inner) = role.id.clone();

        let users = record.messages.iter().filter(|m| m.is_from(Sender::User)).count();
        let assistants = record.messages.len() - users;
        {
            let mut activity = self.activity();
            activity.turns = users.min(assistants) as u64;
            activity.last_activity = record
                .messages
                .last()
                .map_or_else(Utc::now, |m| m.timestamp);
        }

        tracing::info!(
            session_id = %self.id,
            messages = record.messages.len(),
            role = %role.id,
            "Session restored"
        );
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn activity(&self) -> MutexGuard<'_, Activity> {
        self.activity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        self.activity().last_activity = Utc::now();
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Builds a [`SessionEngine`].
pub struct SessionEngineBuilder {
    registry: Arc<RoleRegistry>,
    responder: Arc<dyn Responder>,
    session_id: Option<SessionId>,
    role: Option<String>,
    timeout: Duration,
    max_message_length: usize,
    greeting: Option<String>,
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    voice_max_duration: Duration,
}

impl SessionEngineBuilder {
    fn new(registry: Arc<RoleRegistry>, responder: Arc<dyn Responder>) -> Self {
        Self {
            registry,
            responder,
            session_id: None,
            role: None,
            timeout: DEFAULT_RESPONDER_TIMEOUT,
            max_message_length: DEFAULT_MAX_QUERY_LENGTH,
            greeting: None,
            recognizer: None,
            voice_max_duration: DEFAULT_VOICE_MAX_DURATION,
        }
    }

    /// Apply the `[chat]` and `[voice]` sections. The configured default
    /// role falls back to the first catalog entry when unknown.
    pub fn config(mut self, config: &AquaMindConfig) -> Self {
        let role = self
            .registry
            .resolve_default(&config.chat.default_role)
            .id
            .as_str()
            .to_string();
        self.role = Some(role);
        self.timeout = config.chat.responder_timeout();
        self.max_message_length = config.chat.max_message_length;
        self.greeting = config.chat.greeting.clone();
        self.voice_max_duration = Duration::from_secs(u64::from(config.voice.max_duration_secs));
        self.recognizer = Some(Arc::new(match &config.voice.scripted_transcript {
            Some(text) => ScriptedRecognizer::new(text.clone()),
            None => ScriptedRecognizer::silent(),
        }));
        self
    }

    pub fn session_id(mut self, id: SessionId) -> Self {
        self.session_id = Some(id);
        self
    }

    /// Initial active role. Must exist in the registry.
    pub fn role(mut self, id: impl Into<String>) -> Self {
        self.role = Some(id.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_message_length(mut self, max: usize) -> Self {
        self.max_message_length = max;
        self
    }

    /// Assistant message committed when the session is created.
    pub fn greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = Some(greeting.into());
        self
    }

    pub fn recognizer(mut self, recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn voice_max_duration(mut self, max: Duration) -> Self {
        self.voice_max_duration = max;
        self
    }

    pub fn build(self) -> Result<SessionEngine, ChatError> {
        let role = match &self.role {
            Some(id) => self.registry.get(id)?.id.clone(),
            None => self
                .registry
                .list()
                .first()
                .map(|p| p.id.clone())
                .ok_or_else(|| ChatError::InvalidCatalog("catalog is empty".to_string()))?,
        };

        let input = InputCapture::new(self.max_message_length);
        let recognizer: Arc<dyn SpeechRecognizer> = match self.recognizer {
            Some(recognizer) => recognizer,
            None => Arc::new(ScriptedRecognizer::silent()),
        };
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let now = Utc::now();

        let engine = SessionEngine {
            id: self.session_id.unwrap_or_default(),
            started_at: now,
            transcript: TranscriptStore::new(),
            registry: self.registry,
            responder: self.responder,
            input,
            voice: VoiceCapture::new(recognizer, input, self.voice_max_duration),
            turns: TurnStateMachine::new(),
            active_role: Mutex::new(role),
            timeout: self.timeout,
            events,
            activity: Mutex::new(Activity {
                turns: 0,
                failed_turns: 0,
                last_activity: now,
            }),
        };

        if let Some(greeting) = self.greeting.filter(|g| !g.trim().is_empty()) {
            engine
                .transcript
                .append(MessageDraft::assistant(greeting, MessageKind::Text))?;
        }

        tracing::info!(
            session_id = %engine.id,
            role = %engine.active_role(),
            "Session created"
        );
        Ok(engine)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responder::{Answer, CannedResponder, SelectionStrategy};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn registry() -> Arc<RoleRegistry> {
        Arc::new(RoleRegistry::global().clone())
    }

    fn canned() -> Arc<dyn Responder> {
        Arc::new(CannedResponder::ocean_defaults(SelectionStrategy::First))
    }

    fn engine_with(responder: Arc<dyn Responder>) -> SessionEngine {
        SessionEngine::builder(registry(), responder)
            .role("researcher")
            .build()
            .unwrap()
    }

    fn query(text: &str) -> NormalizedQuery {
        InputCapture::default().submit_text(text).unwrap()
    }

    /// Fails every call with the given error.
    struct FailingResponder(ResponderError);

    #[async_trait]
    impl Responder for FailingResponder {
        async fn respond(
            &self,
            _query: &NormalizedQuery,
            _role: &RoleProfile,
        ) -> Result<Answer, ResponderError> {
            Err(self.0.clone())
        }
    }

    /// Waits for a permit before answering.
    struct GatedResponder {
        gate: Arc<Notify>,
        calls: AtomicUsize,
    }

    impl GatedResponder {
        fn new(gate: Arc<Notify>) -> Self {
            Self {
                gate,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Responder for GatedResponder {
        async fn respond(
            &self,
            query: &NormalizedQuery,
            _role: &RoleProfile,
        ) -> Result<Answer, ResponderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(Answer::text(format!("answer to {query}")))
        }
    }

    /// Never answers.
    struct HangingResponder;

    #[async_trait]
    impl Responder for HangingResponder {
        async fn respond(
            &self,
            _query: &NormalizedQuery,
            _role: &RoleProfile,
        ) -> Result<Answer, ResponderError> {
            std::future::pending().await
        }
    }

    /// Answers with the id of the role it ran under.
    struct RoleEcho;

    #[async_trait]
    impl Responder for RoleEcho {
        async fn respond(
            &self,
            _query: &NormalizedQuery,
            role: &RoleProfile,
        ) -> Result<Answer, ResponderError> {
            Ok(Answer::text(format!("as {}", role.id)))
        }
    }

    // --- scenarios ----------------------------------------------------------

    #[tokio::test]
    async fn test_temperature_profile_scenario() {
        let engine = engine_with(canned());
        let mut states = engine.subscribe_state();

        assert!(!engine.is_recording());
        let outcome = engine.send("Show me temperature profiles").await.unwrap();
        assert!(!engine.is_recording());

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.len(), 2);
        let last = snapshot.last().unwrap();
        assert_eq!(last.sender, Sender::Assistant);
        assert!(matches!(
            last.kind,
            MessageKind::Text | MessageKind::ChartRef | MessageKind::MapRef
        ));
        assert_eq!(outcome.role, RoleId::from("researcher"));
        assert!(!outcome.is_failure());
        assert_eq!(*states.borrow_and_update(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_empty_input_scenario() {
        let engine = engine_with(canned());
        assert!(matches!(engine.send("").await, Err(ChatError::EmptyInput)));
        assert_eq!(engine.snapshot().len(), 0);
    }

    #[tokio::test]
    async fn test_second_submit_while_pending_rejected() {
        let gate = Arc::new(Notify::new());
        let responder = Arc::new(GatedResponder::new(gate.clone()));
        let engine = Arc::new(engine_with(responder.clone()));

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.send("Show me temperature profiles").await })
        };
        while responder.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(engine.is_pending());
        assert_eq!(engine.snapshot().len(), 1);

        let second = engine.send("Where are the floats?").await;
        assert!(matches!(second, Err(ChatError::TurnInProgress)));
        assert_eq!(engine.snapshot().len(), 1);

        gate.notify_one();
        first.await.unwrap().unwrap();
        assert_eq!(engine.snapshot().len(), 2);
        assert!(!engine.is_pending());
        assert_eq!(responder.calls.load(Ordering::SeqCst), 1);
    }

    // --- properties ---------------------------------------------------------

    #[tokio::test]
    async fn test_transcript_is_two_messages_per_turn() {
        let ok = engine_with(canned());
        let failing = engine_with(Arc::new(FailingResponder(ResponderError::Transport(
            "connection refused".into(),
        ))));

        for n in 1..=5 {
            ok.send("Where are the ARGO floats?").await.unwrap();
            let outcome = failing.send("Where are the ARGO floats?").await.unwrap();
            assert!(outcome.is_failure());
            assert_eq!(ok.snapshot().len(), 2 * n);
            assert_eq!(failing.snapshot().len(), 2 * n);
        }

        for (i, message) in failing.snapshot().iter().enumerate() {
            let expected = if i % 2 == 0 { Sender::User } else { Sender::Assistant };
            assert_eq!(message.sender, expected);
        }
    }

    #[tokio::test]
    async fn test_responder_failure_commits_visible_notice() {
        let engine = engine_with(Arc::new(FailingResponder(ResponderError::Rejected(
            "out of coverage".into(),
        ))));
        let outcome = engine.send("Show me the Arctic").await.unwrap();

        assert_eq!(
            outcome.failure,
            Some(ResponderError::Rejected("out of coverage".into()))
        );
        assert_eq!(outcome.reply.kind, MessageKind::Text);
        assert_eq!(outcome.reply.sender, Sender::Assistant);
        assert!(outcome.reply.content.contains("out of coverage"));
        assert_eq!(engine.state(), TurnState::Idle);
        assert_eq!(engine.stats().failed_turns, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_treated_as_failure() {
        let engine = SessionEngine::builder(registry(), Arc::new(HangingResponder))
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap();

        let outcome = engine.send("Show me temperature profiles").await.unwrap();
        assert_eq!(
            outcome.failure,
            Some(ResponderError::Timeout(Duration::from_millis(500)))
        );
        assert!(outcome.reply.content.contains("too long"));
        assert_eq!(engine.snapshot().len(), 2);
        assert!(!engine.is_pending());
    }

    #[tokio::test]
    async fn test_blank_answer_becomes_no_answer_notice() {
        struct Blank;
        #[async_trait]
        impl Responder for Blank {
            async fn respond(
                &self,
                _query: &NormalizedQuery,
                _role: &RoleProfile,
            ) -> Result<Answer, ResponderError> {
                Ok(Answer::text("   "))
            }
        }

        let engine = engine_with(Arc::new(Blank));
        let outcome = engine.send("hello").await.unwrap();
        assert_eq!(outcome.failure, Some(ResponderError::NoAnswer));
        assert_eq!(engine.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_role_switch_applies_to_next_turn() {
        let engine = engine_with(Arc::new(RoleEcho));
        let first = engine.send("hello").await.unwrap();
        assert_eq!(first.reply.content, "as researcher");

        engine.set_active_role("captain").unwrap();
        let second = engine.send("hello").await.unwrap();
        assert_eq!(second.reply.content, "as captain");

        // Earlier entries are untouched.
        assert_eq!(engine.snapshot().get(1).unwrap().content, "as researcher");
    }

    #[tokio::test]
    async fn test_set_role_while_pending_rejected() {
        let gate = Arc::new(Notify::new());
        let responder = Arc::new(GatedResponder::new(gate.clone()));
        let engine = Arc::new(engine_with(responder.clone()));

        let turn = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.send("hello").await })
        };
        while responder.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        assert!(matches!(
            engine.set_active_role("student"),
            Err(ChatError::TurnInProgress)
        ));
        assert!(matches!(engine.clear(), Err(ChatError::TurnInProgress)));

        gate.notify_one();
        turn.await.unwrap().unwrap();
        assert_eq!(engine.active_role(), RoleId::from("researcher"));
        assert!(engine.set_active_role("student").is_ok());
        assert_eq!(engine.active_role(), RoleId::from("student"));
    }

    #[tokio::test]
    async fn test_unknown_role_rejected_without_mutation() {
        let engine = engine_with(canned());
        assert!(matches!(
            engine.set_active_role("pirate"),
            Err(ChatError::UnknownRole(_))
        ));
        let result = engine.submit_turn_as(query("hello"), "pirate").await;
        assert!(matches!(result, Err(ChatError::UnknownRole(id)) if id == "pirate"));
        assert!(engine.snapshot().is_empty());
        assert_eq!(engine.active_role(), RoleId::from("researcher"));
    }

    #[tokio::test]
    async fn test_submit_turn_as_keeps_active_role() {
        let engine = engine_with(Arc::new(RoleEcho));
        let outcome = engine
            .submit_turn_as(query("hello"), "data-analyst")
            .await
            .unwrap();
        assert_eq!(outcome.reply.content, "as data-analyst");
        assert_eq!(engine.active_role(), RoleId::from("researcher"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_turn_commits_cancellation_notice() {
        let engine = engine_with(Arc::new(HangingResponder));
        let mut events = engine.subscribe();
        {
            let turn = engine.send("hello");
            let _ = tokio::time::timeout(Duration::from_millis(10), turn).await;
        }
        assert!(!engine.is_pending());

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.len(), 2);
        let notice = snapshot.last().unwrap();
        assert_eq!(notice.sender, Sender::Assistant);
        assert_eq!(notice.content, CANCELLED_NOTICE);
        assert_eq!(engine.stats().turn_count, 1);
        assert_eq!(engine.stats().failed_turns, 1);

        let mut typing = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::TypingChanged { typing: t, .. } = event {
                typing.push(t);
            }
        }
        assert_eq!(typing, vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_later_turns_alternate_after_dropped_turn() {
        let slow = CannedResponder::ocean_defaults(SelectionStrategy::First)
            .with_latency(Duration::from_secs(1));
        let engine = engine_with(Arc::new(slow));

        let _ = tokio::time::timeout(Duration::from_millis(10), engine.send("first")).await;
        engine.send("second").await.unwrap();
        engine.send("third").await.unwrap();

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.len(), 6);
        for (i, message) in snapshot.iter().enumerate() {
            let expected = if i % 2 == 0 { Sender::User } else { Sender::Assistant };
            assert_eq!(message.sender, expected);
        }
        assert_eq!(engine.stats().turn_count, 3);
    }

    #[tokio::test]
    async fn test_events_follow_turn_lifecycle() {
        let engine = engine_with(canned());
        let mut events = engine.subscribe();
        engine.send("Show me temperature profiles").await.unwrap();

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            assert_eq!(event.session_id(), engine.id());
            names.push(event.name());
        }
        assert_eq!(
            names,
            vec![
                "message_committed",
                "typing_changed",
                "message_committed",
                "typing_changed"
            ]
        );
    }

    #[tokio::test]
    async fn test_snapshot_prefix_is_stable() {
        let engine = engine_with(canned());
        engine.send("hello").await.unwrap();
        let before = engine.snapshot();
        engine.send("again").await.unwrap();
        let after = engine.snapshot();

        assert_eq!(before.len(), 2);
        assert_eq!(after.len(), 4);
        for (a, b) in before.entries().iter().zip(after.entries()) {
            assert!(Arc::ptr_eq(a, b));
        }
    }

    // --- voice --------------------------------------------------------------

    #[tokio::test]
    async fn test_voice_turn() {
        let engine = SessionEngine::builder(registry(), canned())
            .recognizer(Arc::new(ScriptedRecognizer::new(
                "Show me temperature profiles in the Indian Ocean",
            )))
            .build()
            .unwrap();
        let mut events = engine.subscribe();

        let handle = engine.begin_voice_capture().unwrap();
        assert!(engine.is_recording());
        let outcome = engine.submit_voice_turn(handle.id).await.unwrap();
        assert!(!engine.is_recording());
        assert_eq!(
            outcome.user_message.content,
            "Show me temperature profiles in the Indian Ocean"
        );

        let first = events.try_recv().unwrap();
        assert!(matches!(
            first,
            SessionEvent::RecordingChanged { recording: true, .. }
        ));
        let second = events.try_recv().unwrap();
        assert!(matches!(
            second,
            SessionEvent::RecordingChanged { recording: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_voice_without_speech() {
        let engine = engine_with(canned());
        let handle = engine.begin_voice_capture().unwrap();
        assert!(matches!(
            engine.end_voice_capture(handle.id),
            Err(ChatError::NoSpeechDetected)
        ));
        assert!(!engine.is_recording());
        assert!(engine.snapshot().is_empty());
    }

    #[test]
    fn test_cancel_voice_capture() {
        let engine = engine_with(canned());
        let handle = engine.begin_voice_capture().unwrap();
        engine.cancel_voice_capture(handle.id).unwrap();
        assert!(!engine.is_recording());
        assert!(engine.cancel_voice_capture(handle.id).is_err());
    }

    // --- builder, stats, persistence ----------------------------------------

    #[test]
    fn test_builder_rejects_unknown_role() {
        let result = SessionEngine::builder(registry(), canned())
            .role("pirate")
            .build();
        assert!(matches!(result, Err(ChatError::UnknownRole(_))));
    }

    #[test]
    fn test_builder_from_config() {
        let mut config = AquaMindConfig::default();
        config.chat.default_role = "student".to_string();
        config.chat.greeting = Some("Hello! I'm AquaMind.".to_string());
        config.chat.max_message_length = 10;

        let engine = SessionEngine::builder(registry(), canned())
            .config(&config)
            .build()
            .unwrap();
        assert_eq!(engine.active_role(), RoleId::from("student"));
        assert_eq!(engine.snapshot().len(), 1);
        assert_eq!(engine.snapshot().get(0).unwrap().sender, Sender::Assistant);
        assert_eq!(engine.input().max_length(), 10);
    }

    #[test]
    fn test_builder_config_unknown_default_role_falls_back() {
        let mut config = AquaMindConfig::default();
        config.chat.default_role = "pirate".to_string();
        let engine = SessionEngine::builder(registry(), canned())
            .config(&config)
            .build()
            .unwrap();
        assert_eq!(engine.active_role(), RoleId::from("researcher"));
    }

    #[tokio::test]
    async fn test_message_too_long() {
        let engine = SessionEngine::builder(registry(), canned())
            .max_message_length(5)
            .build()
            .unwrap();
        assert!(matches!(
            engine.send("temperature").await,
            Err(ChatError::MessageTooLong(5))
        ));
        assert!(engine.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_stats() {
        let engine = engine_with(canned());
        engine.send("Show me temperature profiles").await.unwrap();
        engine.send("Where are the ARGO floats?").await.unwrap();

        let stats = engine.stats();
        assert_eq!(stats.message_count, 4);
        assert_eq!(stats.turn_count, 2);
        assert_eq!(stats.failed_turns, 0);
        assert_eq!(stats.visualizations, 1);
        assert_eq!(stats.active_role, RoleId::from("researcher"));
        assert!(stats.elapsed_secs >= 0);
    }

    #[tokio::test]
    async fn test_clear_resets_transcript_and_stats() {
        let engine = engine_with(canned());
        engine.send("hello").await.unwrap();
        engine.clear().unwrap();
        assert!(engine.snapshot().is_empty());
        assert_eq!(engine.stats().turn_count, 0);
    }

    #[tokio::test]
    async fn test_export_restore() {
        let source = engine_with(canned());
        source.set_active_role("captain").unwrap();
        source.send("Is my route safe?").await.unwrap();
        let record = source.export();

        let restored = SessionEngine::builder(registry(), canned())
            .session_id(record.session_id)
            .build()
            .unwrap();
        restored.restore(&record).unwrap();

        assert_eq!(restored.id(), source.id());
        assert_eq!(restored.active_role(), RoleId::from("captain"));
        assert_eq!(restored.snapshot().to_vec(), source.snapshot().to_vec());
        assert_eq!(restored.stats().turn_count, 1);

        // A second restore into the now non-empty transcript is refused.
        assert!(matches!(
            restored.restore(&record),
            Err(ChatError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_restore_rejects_malformed_record_atomically() {
        let engine = engine_with(canned());
        let good = Message {
            id: aquamind_core::types::MessageId::new(),
            content: "hello".into(),
            sender: Sender::User,
            timestamp: Utc::now(),
            kind: MessageKind::Text,
        };
        let duplicate = good.clone();
        let record = SessionRecord {
            session_id: engine.id(),
            active_role: RoleId::from("researcher"),
            messages: vec![good, duplicate],
        };
        assert!(matches!(
            engine.restore(&record),
            Err(ChatError::InvalidMessage(_))
        ));
        assert!(engine.snapshot().is_empty());
    }

    #[test]
    fn test_failure_notices() {
        assert!(failure_notice(&ResponderError::Timeout(Duration::from_secs(1))).contains("too long"));
        assert!(failure_notice(&ResponderError::Transport("x".into())).contains("couldn't reach"));
        assert_eq!(
            failure_notice(&ResponderError::Rejected("no data".into())),
            "Sorry, I can't answer that: no data"
        );
        assert!(failure_notice(&ResponderError::NoAnswer).contains("suggested prompts"));
    }
}
