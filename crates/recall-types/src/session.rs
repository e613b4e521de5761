//! Session types for Recall.
//!
//! A session is one ongoing conversation with a stable external identity
//! (e.g. a chat id on a messaging platform).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;

/// One conversation tracked by the memory subsystem.
///
/// Created on the first message from a new conversation and mutated only by
/// `touch` afterwards. Sessions are never deleted by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Stable external identity.
    pub id: String,
    pub platform: String,
    pub user: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, platform: impl Into<String>, user: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            platform: platform.into(),
            user: user.into(),
            created_at: now,
            last_active: now,
        }
    }

    /// Advisory lifecycle state of the session.
    ///
    /// `has_messages` distinguishes a freshly created session from one that
    /// has seen its first append. Idleness is computed from `last_active`
    /// and never enforced here.
    pub fn state(&self, has_messages: bool, idle_timeout: Duration, now: DateTime<Utc>) -> SessionState {
        if !has_messages {
            return SessionState::Created;
        }
        if now - self.last_active >= idle_timeout {
            SessionState::Idle
        } else {
            SessionState::Active
        }
    }
}

/// Advisory lifecycle state: `Created -> Active -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Created,
    Active,
    Idle,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Created => write!(f, "created"),
            SessionState::Active => write!(f, "active"),
            SessionState::Idle => write!(f, "idle"),
        }
    }
}
