//! Input capture: turns raw typed text or recognized speech into a single
//! normalized query payload.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// Default maximum query length in characters.
pub const DEFAULT_MAX_QUERY_LENGTH: usize = 2000;

/// How a query entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    Text,
    Voice,
}

/// A query that passed input validation.
///
/// Whitespace is trimmed and internal runs collapse to one space; control
/// characters are dropped. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NormalizedQuery {
    text: String,
    source: InputSource,
}

impl NormalizedQuery {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> InputSource {
        self.source
    }

    pub fn into_inner(self) -> String {
        self.text
    }
}

impl fmt::Display for NormalizedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Validates and normalizes user input for a session.
#[derive(Debug, Clone, Copy)]
pub struct InputCapture {
    max_length: usize,
}

impl Default for InputCapture {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUERY_LENGTH)
    }
}

impl InputCapture {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Normalize typed text. Fails with `EmptyInput` when nothing but
    /// whitespace remains.
    pub fn submit_text(&self, raw: &str) -> Result<NormalizedQuery, ChatError> {
        self.normalize(raw, InputSource::Text)
    }

    /// Normalize a speech transcript. An empty transcript means no speech.
    pub fn submit_transcript(&self, raw: &str) -> Result<NormalizedQuery, ChatError> {
        self.normalize(raw, InputSource::Voice)
            .map_err(|e| match e {
                ChatError::EmptyInput => ChatError::NoSpeechDetected,
                other => other,
            })
    }

    fn normalize(&self, raw: &str, source: InputSource) -> Result<NormalizedQuery, ChatError> {
        let text = raw
            .split_whitespace()
            .map(|word| word.chars().filter(|c| !c.is_control()).collect::<String>())
            .filter(|word| !word.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if text.is_empty() {
            return Err(ChatError::EmptyInput);
        }
        if text.chars().count() > self.max_length {
            return Err(ChatError::MessageTooLong(self.max_length));
        }

        Ok(NormalizedQuery { text, source })
    }
}

// =============================================================================
// Tests
// =============================================================================
