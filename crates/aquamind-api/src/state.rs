//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use aquamind_chat::{CannedResponder, ChatError, Responder, RoleRegistry, SessionManager};
use aquamind_core::config::AquaMindConfig;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration, read-only after startup.
    pub config: Arc<AquaMindConfig>,
    /// Every live chat session.
    pub sessions: Arc<SessionManager>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Build state with the canned responder described by `[responder]`.
    ///
    /// A `[[roles]]` table in the config replaces the built-in catalog.
    pub fn new(config: AquaMindConfig) -> Result<Self, ChatError> {
        let responder = Arc::new(CannedResponder::from_config(&config.responder));
        Self::with_responder(config, responder)
    }

    pub fn with_responder(
        config: AquaMindConfig,
        responder: Arc<dyn Responder>,
    ) -> Result<Self, ChatError> {
        let registry = if config.roles.is_empty() {
            RoleRegistry::global().clone()
        } else {
            RoleRegistry::from_config(&config.roles)?
        };
        let sessions = SessionManager::new(Arc::new(registry), responder, config.clone());
        Ok(Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            start_time: Instant::now(),
        })
    }
}
