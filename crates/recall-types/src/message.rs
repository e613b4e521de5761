//! Short-term message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Author role of a message.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (role IN ('user', 'assistant', 'system', 'tool'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            "tool" => Ok(Role::Tool),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// A single message in a session's short-term log.
///
/// Immutable once written; the only mutation is eviction (deletion).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub session_id: String,
    /// Position in the session, strictly increasing and never reused.
    pub seq: u64,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Pinned messages are never evicted by pruning.
    #[serde(default)]
    pub pinned: bool,
}

/// Input for appending a message; `seq` and `created_at` are assigned on write.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip() {
        for role in [Role::User, Role::Assistant, Role::System, Role::Tool] {
            let parsed: Role = role.to_string().parse().unwrap();
            assert_eq!(parsed, role);
        }
        assert!("narrator".parse::<Role>().is_err());
    }

    #[test]
    fn test_pinned_defaults_to_false() {
        let json = r#"{
            "session_id": "s1",
            "seq": 3,
            "role": "user",
            "content": "hi",
            "created_at": "2025-01-01T00:00:00Z"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert!(!msg.pinned);
        assert_eq!(msg.seq, 3);
    }
}
