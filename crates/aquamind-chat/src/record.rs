//! Persisted form of a session.
//!
//! ```json
//! {
//!   "session_id": "…",
//!   "active_role": "researcher",
//!   "messages": [{"id": "…", "content": "…", "sender": "user", "timestamp": "…", "kind": "text"}]
//! }
//! ```
//!
//! Restoring replays the messages through the transcript store in order.

use serde::{Deserialize, Serialize};

use aquamind_core::types::{Message, RoleId, SessionId};

use crate::error::ChatError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub active_role: RoleId,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl SessionRecord {
    pub fn to_json(&self) -> Result<String, ChatError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ChatError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aquamind_core::types::{MessageId, MessageKind, Sender};
    use chrono::Utc;

    #[test]
    fn test_wire_shape() {
        let record = SessionRecord {
            session_id: SessionId::new(),
            active_role: RoleId::from("captain"),
            messages: vec![Message {
                id: MessageId::new(),
                content: "Floats near me".into(),
                sender: Sender::User,
                timestamp: Utc::now(),
                kind: MessageKind::MapRef,
            }],
        };
        let value: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(value["active_role"], "captain");
        assert_eq!(value["messages"][0]["sender"], "user");
        assert_eq!(value["messages"][0]["kind"], "map-ref");
        assert!(value["messages"][0]["timestamp"].is_string());

        let back = SessionRecord::from_json(&record.to_json().unwrap()).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_missing_messages_defaults_to_empty() {
        let json = format!(
            r#"{{"session_id":"{}","active_role":"student"}}"#,
            SessionId::new()
        );
        let record = SessionRecord::from_json(&json).unwrap();
        assert!(record.messages.is_empty());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            SessionRecord::from_json("{not json"),
            Err(ChatError::Serialization(_))
        ));
    }
}
