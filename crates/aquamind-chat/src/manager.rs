//! Many independent sessions keyed by id, with chat-history summaries and
//! idle reaping.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use aquamind_core::config::AquaMindConfig;
use aquamind_core::types::{RoleId, Sender, SessionId};

use crate::engine::SessionEngine;
use crate::error::ChatError;
use crate::record::SessionRecord;
use crate::responder::Responder;
use crate::roles::RoleRegistry;

/// Maximum title length in characters.
pub const TITLE_MAX_CHARS: usize = 60;

const UNTITLED: &str = "New conversation";

/// One row of the chat history list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub title: String,
    pub message_count: usize,
    pub active_role: RoleId,
    pub pending: bool,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl SessionSummary {
    fn of(engine: &SessionEngine) -> Self {
        let snapshot = engine.snapshot();
        let title = snapshot
            .iter()
            .find(|m| m.is_from(Sender::User))
            .map_or_else(|| UNTITLED.to_string(), |m| title_from(&m.content));
        Self {
            id: engine.id(),
            title,
            message_count: snapshot.len(),
            active_role: engine.active_role(),
            pending: engine.is_pending(),
            started_at: engine.started_at(),
            last_activity: engine.last_activity(),
        }
    }
}

fn title_from(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head.trim_end())
    } else {
        head
    }
}

/// Owns every live session.
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<SessionEngine>>>,
    registry: Arc<RoleRegistry>,
    responder: Arc<dyn Responder>,
    config: AquaMindConfig,
}

impl SessionManager {
    pub fn new(
        registry: Arc<RoleRegistry>,
        responder: Arc<dyn Responder>,
        config: AquaMindConfig,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            registry,
            responder,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<RoleRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &AquaMindConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionId, Arc<SessionEngine>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionId, Arc<SessionEngine>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a session, optionally under a specific role.
    pub fn create(&self, role: Option<&str>) -> Result<Arc<SessionEngine>, ChatError> {
        let mut builder = SessionEngine::builder(self.registry.clone(), self.responder.clone())
            .config(&self.config);
        if let Some(role) = role {
            builder = builder.role(role);
        }
        let engine = Arc::new(builder.build()?);
        self.write().insert(engine.id(), engine.clone());
        Ok(engine)
    }

    pub fn get(&self, id: SessionId) -> Result<Arc<SessionEngine>, ChatError> {
        self.read()
            .get(&id)
            .cloned()
            .ok_or(ChatError::SessionNotFound(id))
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Summaries, most recently active first.
    pub fn list(&self) -> Vec<SessionSummary> {
        let engines: Vec<Arc<SessionEngine>> = self.read().values().cloned().collect();
        let mut summaries: Vec<SessionSummary> =
            engines.iter().map(|e| SessionSummary::of(e)).collect();
        summaries.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        summaries
    }

    /// Tear a session down. Outstanding handles keep working until dropped.
    pub fn delete(&self, id: SessionId) -> Result<(), ChatError> {
        if self.write().remove(&id).is_none() {
            return Err(ChatError::SessionNotFound(id));
        }
        tracing::info!(session_id = %id, "Session deleted");
        Ok(())
    }

    /// Create a session from a persisted record.
    ///
    /// Replaces nothing: importing an id that is already live fails.
    pub fn import(&self, record: &SessionRecord) -> Result<Arc<SessionEngine>, ChatError> {
        let engine = SessionEngine::builder(self.registry.clone(), self.responder.clone())
            .config(&self.config)
            .session_id(record.session_id)
            .build()?;
        // The greeting, if configured, would collide with the replayed history.
        engine.clear()?;
        engine.restore(record)?;

        match self.write().entry(record.session_id) {
            Entry::Occupied(_) => Err(ChatError::InvalidMessage(format!(
                "session {} already exists",
                record.session_id
            ))),
            Entry::Vacant(slot) => Ok(slot.insert(Arc::new(engine)).clone()),
        }
    }

    /// Drop idle sessions whose last activity is older than the configured
    /// session timeout. Also cancels voice captures left running too long.
    pub fn reap_expired(&self) -> Vec<SessionId> {
        let timeout = Duration::from_secs(u64::from(self.config.chat.session_timeout_minutes) * 60);
        self.reap_idle_for(timeout)
    }

    pub fn reap_idle_for(&self, timeout: Duration) -> Vec<SessionId> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::zero());

        let mut sessions = self.write();
        for engine in sessions.values() {
            engine.cancel_expired_capture();
        }
        let expired: Vec<SessionId> = sessions
            .values()
            .filter(|e| !e.is_pending() && e.last_activity() <= cutoff)
            .map(|e| e.id())
            .collect();
        for id in &expired {
            sessions.remove(id);
            tracing::info!(session_id = %id, "Reaped idle session");
        }
        expired
    }
}

// =============================================================================
// Tests
// =============================================================================
