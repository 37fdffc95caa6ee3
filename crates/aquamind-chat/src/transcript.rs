//! Append-only transcript store.
//!
//! Messages are committed in order and never edited, removed or reordered.
//! Each committed message is held behind an `Arc`, so a snapshot is a cheap
//! list of shared pointers: later appends never touch an earlier snapshot,
//! and the entries two snapshots share are the same allocations.

use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, Serializer};

use aquamind_core::types::{Message, MessageId, MessageKind, Sender};

use crate::error::ChatError;

/// A message that has not been committed yet.
///
/// `id` and `timestamp` are assigned on append when absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    pub id: Option<MessageId>,
    pub content: String,
    pub sender: Sender,
    pub timestamp: Option<DateTime<Utc>>,
    pub kind: MessageKind,
}

impl MessageDraft {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: None,
            content: content.into(),
            sender: Sender::User,
            timestamp: None,
            kind: MessageKind::Text,
        }
    }

    pub fn assistant(content: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            id: None,
            content: content.into(),
            sender: Sender::Assistant,
            timestamp: None,
            kind,
        }
    }

    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

impl From<Message> for MessageDraft {
    fn from(msg: Message) -> Self {
        Self {
            id: Some(msg.id),
            content: msg.content,
            sender: msg.sender,
            timestamp: Some(msg.timestamp),
            kind: msg.kind,
        }
    }
}

/// Read-only view of the transcript at one point in time.
#[derive(Debug, Clone, Default)]
pub struct TranscriptSnapshot {
    messages: Vec<Arc<Message>>,
}

impl TranscriptSnapshot {
    /// Shared handles to the committed messages, in commit order.
    pub fn entries(&self) -> &[Arc<Message>] {
        &self.messages
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().map(Deref::deref)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index).map(Deref::deref)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last().map(Deref::deref)
    }

    /// Owned copies of every message.
    pub fn to_vec(&self) -> Vec<Message> {
        self.iter().cloned().collect()
    }
}

impl Serialize for TranscriptSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// Ordered, append-only message log for one session.
#[derive(Debug, Default)]
pub struct TranscriptStore {
    messages: Mutex<Vec<Arc<Message>>>,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a message at the tail of the transcript.
    ///
    /// Fails with `InvalidMessage` when the content is blank, when an explicit
    /// id is already present, or when an explicit timestamp would place the
    /// message before the current tail.
    pub fn append(&self, draft: MessageDraft) -> Result<Message, ChatError> {
        if draft.content.trim().is_empty() {
            return Err(ChatError::InvalidMessage("content is blank".to_string()));
        }

        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        let tail_ts = messages.last().map(|m| m.timestamp);

        if let Some(id) = draft.id {
            if messages.iter().any(|m| m.id == id) {
                return Err(ChatError::InvalidMessage(format!("duplicate id {}", id)));
            }
        }

        let timestamp = match (draft.timestamp, tail_ts) {
            (Some(ts), Some(tail)) if ts < tail => {
                return Err(ChatError::InvalidMessage(format!(
                    "timestamp {} precedes transcript tail {}",
                    ts.to_rfc3339(),
                    tail.to_rfc3339()
                )));
            }
            (Some(ts), _) => ts,
            // Wall clock may step backwards; commit order wins.
            (None, Some(tail)) => Utc::now().max(tail),
            (None, None) => Utc::now(),
        };

        let message = Message {
            id: draft.id.unwrap_or_default(),
            content: draft.content,
            sender: draft.sender,
            timestamp,
            kind: draft.kind,
        };
        messages.push(Arc::new(message.clone()));

        tracing::debug!(
            message_id = %message.id,
            sender = %message.sender,
            position = messages.len() - 1,
            "Message committed"
        );
        Ok(message)
    }

    /// Point-in-time copy of the transcript.
    pub fn snapshot(&self) -> TranscriptSnapshot {
        let messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        TranscriptSnapshot {
            messages: messages.clone(),
        }
    }

    /// Reset to an empty transcript.
    pub fn clear(&self) {
        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(discarded = messages.len(), "Transcript cleared");
        messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Tests
// =============================================================================
