use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AquaError, Result};

/// Top-level configuration for the AquaMind application.
///
/// Loaded from `~/.aquamind/config.toml` by default. Each section corresponds
/// to one concern of the conversational session engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AquaMindConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub responder: ResponderConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    /// Role catalog override. Empty means "use the built-in catalog".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<RoleProfileConfig>,
}

impl AquaMindConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AquaMindConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AquaError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// API server port.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            port: 3030,
        }
    }
}

/// Conversational session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Upper bound on a single responder call before the turn is failed.
    pub responder_timeout_ms: u64,
    /// Maximum normalized query length in characters.
    pub max_message_length: usize,
    /// Assistant greeting appended when a session is created.
    pub greeting: Option<String>,
    /// Role a new session starts with.
    pub default_role: String,
    /// Idle sessions older than this are reaped by the session manager.
    pub session_timeout_minutes: u32,
}

impl ChatConfig {
    pub fn responder_timeout(&self) -> Duration {
        Duration::from_millis(self.responder_timeout_ms)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            responder_timeout_ms: 10_000,
            max_message_length: 2000,
            greeting: None,
            default_role: "researcher".to_string(),
            session_timeout_minutes: 30,
        }
    }
}

/// How the stub responder picks among several candidate answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Always the first eligible candidate.
    First,
    /// Cycle through eligible candidates turn by turn.
    RoundRobin,
    /// Uniformly random, optionally seeded.
    #[default]
    Random,
}

/// Stub responder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    /// Simulated "thinking" latency in milliseconds.
    pub latency_ms: u64,
    /// Candidate selection policy.
    pub selection: SelectionMode,
    /// Seed for `selection = "random"`. Unset means OS entropy.
    pub seed: Option<u64>,
}

impl ResponderConfig {
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            latency_ms: 1500,
            selection: SelectionMode::Random,
            seed: None,
        }
    }
}

/// Voice capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Recordings past this are logged when stopped and cancelled by the idle reaper.
    pub max_duration_secs: u32,
    /// Text returned by the scripted recognizer. Unset means "no speech".
    pub scripted_transcript: Option<String>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 30,
            scripted_transcript: Some(
                "Show me temperature profiles in the Indian Ocean".to_string(),
            ),
        }
    }
}

/// One `[[roles]]` entry of a catalog override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleProfileConfig {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub prompt_hints: Vec<String>,
}
