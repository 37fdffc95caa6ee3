//! Route handler functions for all API endpoints.
//!
//! Each handler resolves the session from the path, calls into the chat
//! engine, and returns a JSON response. Errors go through `ApiError`.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use aquamind_chat::{
    CaptureHandle, ChatError, RoleProfile, SessionEngine, SessionRecord, SessionStats, SessionSummary,
    TranscriptSnapshot, TurnOutcome, TurnState, QUICK_PROMPTS,
};
use aquamind_core::types::{CaptureId, Message, RoleId, SessionId};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub text: String,
    /// Answer this one turn under another role.
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct VoiceStopRequest {
    pub capture_id: Uuid,
    /// Run the recognized text as a turn right away.
    #[serde(default)]
    pub submit: bool,
}

#[derive(Debug, Deserialize)]
pub struct VoiceCancelRequest {
    pub capture_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PromptParams {
    pub role: Option<String>,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub session_count: usize,
}

#[derive(Debug, Serialize)]
pub struct RolesResponse {
    pub default_role: RoleId,
    pub roles: Vec<RoleProfile>,
}

#[derive(Debug, Serialize)]
pub struct RoleDetail {
    #[serde(flatten)]
    pub profile: RoleProfile,
    /// Role hints followed by the general quick prompts.
    pub prompts: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptsResponse {
    pub prompts: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: SessionId,
    pub active_role: RoleId,
    pub state: TurnState,
    pub recording: bool,
    pub stats: SessionStats,
}

impl SessionView {
    fn of(engine: &SessionEngine) -> Self {
        Self {
            id: engine.id(),
            active_role: engine.active_role(),
            state: engine.state(),
            recording: engine.is_recording(),
            stats: engine.stats(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub messages: TranscriptSnapshot,
    /// Typing indicator for the dashboard.
    pub pending: bool,
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub user_message: Message,
    pub reply: Message,
    pub role: RoleId,
    pub failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<TurnOutcome> for TurnResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            failed: outcome.is_failure(),
            error: outcome.failure.map(|e| e.to_string()),
            user_message: outcome.user_message,
            reply: outcome.reply,
            role: outcome.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RoleChangedResponse {
    pub active_role: RoleId,
    pub prompts: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct VoiceStopResponse {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn: Option<TurnResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
}

fn session(state: &AppState, id: Uuid) -> Result<Arc<SessionEngine>, ApiError> {
    Ok(state.sessions.get(SessionId(id))?)
}

// =============================================================================
// Catalog
// =============================================================================

/// GET /health - liveness and uptime.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        session_count: state.sessions.len(),
    })
}

/// GET /roles - the role catalog in display order.
pub async fn list_roles(State(state): State<AppState>) -> Json<RolesResponse> {
    let registry = state.sessions.registry();
    Json(RolesResponse {
        default_role: registry
            .resolve_default(&state.config.chat.default_role)
            .id
            .clone(),
        roles: registry.list().to_vec(),
    })
}

/// GET /roles/{id} - one role with its prompt suggestions.
pub async fn get_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RoleDetail>, ApiError> {
    let registry = state.sessions.registry();
    let profile = registry.get(&id)?.clone();
    let prompts = registry.prompt_hints_for(&id)?;
    Ok(Json(RoleDetail { profile, prompts }))
}

/// GET /prompts?role= - quick prompts, optionally merged with a role's hints.
pub async fn prompts(
    State(state): State<AppState>,
    Query(params): Query<PromptParams>,
) -> Result<Json<PromptsResponse>, ApiError> {
    let prompts = match params.role {
        Some(role) => state.sessions.registry().prompt_hints_for(&role)?,
        None => QUICK_PROMPTS.iter().map(|p| p.to_string()).collect(),
    };
    Ok(Json(PromptsResponse { prompts }))
}

// =============================================================================
// Sessions
// =============================================================================

/// GET /sessions - chat history, most recent first.
pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionsResponse> {
    Json(SessionsResponse {
        sessions: state.sessions.list(),
    })
}

/// POST /sessions - start a conversation.
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let engine = state.sessions.create(req.role.as_deref())?;
    Ok((StatusCode::CREATED, Json(SessionView::of(&engine))))
}

/// POST /sessions/import - restore a conversation from an exported record.
pub async fn import_session(
    State(state): State<AppState>,
    Json(record): Json<SessionRecord>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let engine = state.sessions.import(&record)?;
    Ok((StatusCode::CREATED, Json(SessionView::of(&engine))))
}

/// GET /sessions/{id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let engine = session(&state, id)?;
    Ok(Json(SessionView::of(&engine)))
}

/// DELETE /sessions/{id}
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.sessions.delete(SessionId(id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /sessions/{id}/transcript
pub async fn transcript(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TranscriptResponse>, ApiError> {
    let engine = session(&state, id)?;
    Ok(Json(TranscriptResponse {
        messages: engine.snapshot(),
        pending: engine.is_pending(),
    }))
}

/// POST /sessions/{id}/clear - start over in the same session.
pub async fn clear_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let engine = session(&state, id)?;
    engine.clear()?;
    Ok(Json(SessionView::of(&engine)))
}

/// GET /sessions/{id}/export
pub async fn export_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionRecord>, ApiError> {
    let engine = session(&state, id)?;
    Ok(Json(engine.export()))
}

// =============================================================================
// Turns & roles
// =============================================================================

/// POST /sessions/{id}/turns - ask a question and wait for the reply.
pub async fn submit_turn(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, ApiError> {
    let engine = session(&state, id)?;
    let query = engine.input().submit_text(&req.text)?;
    let outcome = match req.role.as_deref() {
        Some(role) => engine.submit_turn_as(query, role).await?,
        None => engine.submit_turn(query).await?,
    };
    Ok(Json(outcome.into()))
}

/// PUT /sessions/{id}/role - switch the role used from the next turn on.
pub async fn set_role(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetRoleRequest>,
) -> Result<Json<RoleChangedResponse>, ApiError> {
    let engine = session(&state, id)?;
    let profile = engine.set_active_role(&req.role)?;
    let prompts = engine.registry().prompt_hints_for(profile.id.as_str())?;
    Ok(Json(RoleChangedResponse {
        active_role: profile.id.clone(),
        prompts,
    }))
}

// =============================================================================
// Voice
// =============================================================================

/// POST /sessions/{id}/voice/start
pub async fn voice_start(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<CaptureHandle>), ApiError> {
    let engine = session(&state, id)?;
    let handle = engine.begin_voice_capture()?;
    Ok((StatusCode::CREATED, Json(handle)))
}

/// POST /sessions/{id}/voice/stop - recognize, and optionally submit.
pub async fn voice_stop(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<VoiceStopRequest>,
) -> Result<Json<VoiceStopResponse>, ApiError> {
    let engine = session(&state, id)?;
    // Refuse before the capture is consumed so the recording stays retryable.
    if req.submit && engine.is_pending() {
        return Err(ChatError::TurnInProgress.into());
    }
    let query = engine.end_voice_capture(CaptureId(req.capture_id))?;
    let text = query.as_str().to_string();

    let turn = if req.submit {
        Some(engine.submit_turn(query).await?.into())
    } else {
        None
    };
    Ok(Json(VoiceStopResponse { query: text, turn }))
}

/// POST /sessions/{id}/voice/cancel
pub async fn voice_cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<VoiceCancelRequest>,
) -> Result<Json<ActionResult>, ApiError> {
    let engine = session(&state, id)?;
    engine.cancel_voice_capture(CaptureId(req.capture_id))?;
    Ok(Json(ActionResult {
        success: true,
        message: "Voice capture cancelled".to_string(),
    }))
}

// =============================================================================
// Streaming
// =============================================================================

/// GET /sessions/{id}/stream - live session events.
pub async fn stream(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>> + Send>, ApiError> {
    let engine = session(&state, id)?;
    let rx = engine.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Some(Ok(Event::default().event(event.name()).data(data)))
        }
        Err(_) => None,
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
